//! Slot type lattice

use rewind_bytecode::{FieldType, StackKind};
use serde::Serialize;
use std::fmt;

/// Root class every reference type merges to
pub const OBJECT_CLASS: &str = "rt/Object";

/// Type on entry to a catch-all handler
pub const THROWABLE_CLASS: &str = "rt/Throwable";

/// String class pushed by `Ldc`
pub const STRING_CLASS: &str = "rt/String";

/// Inferred type of a local variable or operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotType {
    /// Boolean-ish int
    Boolean,
    /// Byte-ish int
    Byte,
    /// Char-ish int
    Char,
    /// Short-ish int
    Short,
    /// 32-bit int
    Int,
    /// 32-bit float
    Float,
    /// 64-bit int
    Long,
    /// 64-bit float
    Double,
    /// The null constant, before it meets a concrete reference type
    Null,
    /// Reference of the named class (array descriptors for arrays)
    Object(String),
}

impl SlotType {
    /// Reference of class `name`
    pub fn object(name: impl Into<String>) -> Self {
        SlotType::Object(name.into())
    }

    /// Type of a declared field, parameter or return value
    pub fn from_field_type(ty: &FieldType) -> Self {
        match ty {
            FieldType::Boolean => SlotType::Boolean,
            FieldType::Byte => SlotType::Byte,
            FieldType::Char => SlotType::Char,
            FieldType::Short => SlotType::Short,
            FieldType::Int => SlotType::Int,
            FieldType::Long => SlotType::Long,
            FieldType::Float => SlotType::Float,
            FieldType::Double => SlotType::Double,
            FieldType::Object(name) => SlotType::Object(name.clone()),
            FieldType::Array(_) => SlotType::Object(ty.to_string()),
        }
    }

    /// Most general type of a storage category
    pub fn from_kind(kind: StackKind) -> Self {
        match kind {
            StackKind::Int => SlotType::Int,
            StackKind::Long => SlotType::Long,
            StackKind::Float => SlotType::Float,
            StackKind::Double => SlotType::Double,
            StackKind::Object => SlotType::object(OBJECT_CLASS),
        }
    }

    /// Storage category used to save and restore the slot
    pub fn stack_kind(&self) -> StackKind {
        match self {
            SlotType::Boolean
            | SlotType::Byte
            | SlotType::Char
            | SlotType::Short
            | SlotType::Int => StackKind::Int,
            SlotType::Float => StackKind::Float,
            SlotType::Long => StackKind::Long,
            SlotType::Double => StackKind::Double,
            SlotType::Null | SlotType::Object(_) => StackKind::Object,
        }
    }

    /// Whether this is one of the int-ish primitives
    pub fn is_int_like(&self) -> bool {
        self.stack_kind() == StackKind::Int
    }

    /// Whether this counts as two words for `Pop2`/`Dup2`/`DupX2`
    pub fn is_wide(&self) -> bool {
        self.stack_kind().is_wide()
    }

    /// Element type when this is an array type
    pub fn array_element(&self) -> Option<SlotType> {
        match self {
            SlotType::Object(name) if name.starts_with('[') => FieldType::parse(&name[1..])
                .ok()
                .map(|ty| SlotType::from_field_type(&ty)),
            _ => None,
        }
    }

    /// Least upper bound at a control-flow join
    ///
    /// Identical types are kept, differing int-ish types widen to `Int`,
    /// `Null` takes the other reference type, and anything else collapses to
    /// the root object type.
    pub fn merge(&self, other: &SlotType) -> SlotType {
        if self == other {
            return self.clone();
        }
        match (self, other) {
            (a, b) if a.is_int_like() && b.is_int_like() => SlotType::Int,
            (SlotType::Null, SlotType::Object(name)) | (SlotType::Object(name), SlotType::Null) => {
                SlotType::Object(name.clone())
            }
            _ => SlotType::object(OBJECT_CLASS),
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotType::Boolean => f.write_str("boolean"),
            SlotType::Byte => f.write_str("byte"),
            SlotType::Char => f.write_str("char"),
            SlotType::Short => f.write_str("short"),
            SlotType::Int => f.write_str("int"),
            SlotType::Float => f.write_str("float"),
            SlotType::Long => f.write_str("long"),
            SlotType::Double => f.write_str("double"),
            SlotType::Null => f.write_str("null"),
            SlotType::Object(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_rules() {
        assert_eq!(SlotType::Int.merge(&SlotType::Int), SlotType::Int);
        assert_eq!(SlotType::Byte.merge(&SlotType::Char), SlotType::Int);
        assert_eq!(SlotType::Boolean.merge(&SlotType::Int), SlotType::Int);
        assert_eq!(
            SlotType::Null.merge(&SlotType::object("app/A")),
            SlotType::object("app/A")
        );
        assert_eq!(
            SlotType::object("app/A").merge(&SlotType::object("app/B")),
            SlotType::object(OBJECT_CLASS)
        );
        assert_eq!(
            SlotType::Int.merge(&SlotType::Long),
            SlotType::object(OBJECT_CLASS)
        );
    }

    #[test]
    fn test_array_element() {
        let ints = SlotType::object("[I");
        assert_eq!(ints.array_element(), Some(SlotType::Int));
        let nested = SlotType::object("[[Lapp/A;");
        assert_eq!(nested.array_element(), Some(SlotType::object("[Lapp/A;")));
        assert_eq!(SlotType::object("app/A").array_element(), None);
    }

    #[test]
    fn test_from_descriptor() {
        let ty = FieldType::parse("[J").unwrap();
        assert_eq!(SlotType::from_field_type(&ty), SlotType::object("[J"));
        assert_eq!(SlotType::Short.stack_kind(), StackKind::Int);
        assert!(SlotType::Double.is_wide());
    }
}
