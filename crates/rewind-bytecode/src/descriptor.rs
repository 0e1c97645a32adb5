//! Field and method descriptors
//!
//! Descriptors use the familiar JVM notation: `I` int, `J` long, `F` float,
//! `D` double, `Z` boolean, `B` byte, `C` char, `S` short, `V` void (return
//! only), `Lpkg/Name;` object and `[T` array. A method descriptor is
//! `(params)ret`.

use crate::insn::StackKind;
use std::fmt;
use thiserror::Error;

/// Descriptor parse errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// Input ended inside a type
    #[error("Unterminated descriptor: {0}")]
    Unterminated(String),

    /// Unknown type character
    #[error("Invalid type character '{ch}' in descriptor {descriptor}")]
    InvalidChar {
        /// Offending character
        ch: char,
        /// The full descriptor
        descriptor: String,
    },

    /// Method descriptor doesn't start with `(`
    #[error("Malformed method descriptor: {0}")]
    MalformedMethod(String),
}

/// A value type as written in a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `Z`
    Boolean,
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `F`
    Float,
    /// `D`
    Double,
    /// `Lname;`
    Object(String),
    /// `[T`
    Array(Box<FieldType>),
}

impl FieldType {
    /// Parse a single field descriptor
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let mut chars = descriptor.char_indices().peekable();
        let ty = parse_one(descriptor, &mut chars)?;
        if chars.next().is_some() {
            return Err(DescriptorError::Unterminated(descriptor.to_string()));
        }
        Ok(ty)
    }

    /// The storage category used by locals and the operand stack
    pub fn stack_kind(&self) -> StackKind {
        match self {
            FieldType::Boolean
            | FieldType::Byte
            | FieldType::Char
            | FieldType::Short
            | FieldType::Int => StackKind::Int,
            FieldType::Long => StackKind::Long,
            FieldType::Float => StackKind::Float,
            FieldType::Double => StackKind::Double,
            FieldType::Object(_) | FieldType::Array(_) => StackKind::Object,
        }
    }

    /// Whether this is a reference type
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    /// The name used by `Checkcast` for this type: the internal class name
    /// for objects and the full descriptor for arrays
    pub fn class_name(&self) -> Option<String> {
        match self {
            FieldType::Object(name) => Some(name.clone()),
            FieldType::Array(_) => Some(self.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Boolean => f.write_str("Z"),
            FieldType::Byte => f.write_str("B"),
            FieldType::Char => f.write_str("C"),
            FieldType::Short => f.write_str("S"),
            FieldType::Int => f.write_str("I"),
            FieldType::Long => f.write_str("J"),
            FieldType::Float => f.write_str("F"),
            FieldType::Double => f.write_str("D"),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Array(elem) => write!(f, "[{}", elem),
        }
    }
}

/// A parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Parameter types, in declaration order
    pub params: Vec<FieldType>,
    /// Return type, `None` for `V`
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    /// Parse a method descriptor such as `(ILjava/lang/Object;)V`
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let mut chars = descriptor.char_indices().peekable();
        match chars.next() {
            Some((_, '(')) => {}
            _ => return Err(DescriptorError::MalformedMethod(descriptor.to_string())),
        }

        let mut params = Vec::new();
        loop {
            match chars.peek() {
                Some((_, ')')) => {
                    chars.next();
                    break;
                }
                Some(_) => params.push(parse_one(descriptor, &mut chars)?),
                None => return Err(DescriptorError::Unterminated(descriptor.to_string())),
            }
        }

        let ret = match chars.peek() {
            Some((_, 'V')) => {
                chars.next();
                None
            }
            Some(_) => Some(parse_one(descriptor, &mut chars)?),
            None => return Err(DescriptorError::Unterminated(descriptor.to_string())),
        };

        if chars.next().is_some() {
            return Err(DescriptorError::MalformedMethod(descriptor.to_string()));
        }
        Ok(Self { params, ret })
    }

    /// Number of argument slots (every parameter takes one slot)
    pub fn arg_count(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for p in &self.params {
            write!(f, "{}", p)?;
        }
        f.write_str(")")?;
        match &self.ret {
            Some(ret) => write!(f, "{}", ret),
            None => f.write_str("V"),
        }
    }
}

fn parse_one(
    descriptor: &str,
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Result<FieldType, DescriptorError> {
    let (start, ch) = chars
        .next()
        .ok_or_else(|| DescriptorError::Unterminated(descriptor.to_string()))?;
    let ty = match ch {
        'Z' => FieldType::Boolean,
        'B' => FieldType::Byte,
        'C' => FieldType::Char,
        'S' => FieldType::Short,
        'I' => FieldType::Int,
        'J' => FieldType::Long,
        'F' => FieldType::Float,
        'D' => FieldType::Double,
        '[' => FieldType::Array(Box::new(parse_one(descriptor, chars)?)),
        'L' => {
            let name_start = start + 1;
            loop {
                match chars.next() {
                    Some((end, ';')) => break FieldType::Object(descriptor[name_start..end].to_string()),
                    Some(_) => continue,
                    None => return Err(DescriptorError::Unterminated(descriptor.to_string())),
                }
            }
        }
        other => {
            return Err(DescriptorError::InvalidChar {
                ch: other,
                descriptor: descriptor.to_string(),
            })
        }
    };
    Ok(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_descriptor() {
        let desc = MethodDescriptor::parse("(I[JLrt/Counter;)Ljava/lang/Object;").unwrap();
        assert_eq!(
            desc.params,
            vec![
                FieldType::Int,
                FieldType::Array(Box::new(FieldType::Long)),
                FieldType::Object("rt/Counter".to_string()),
            ]
        );
        assert_eq!(desc.ret, Some(FieldType::Object("java/lang/Object".to_string())));
        assert_eq!(desc.to_string(), "(I[JLrt/Counter;)Ljava/lang/Object;");
    }

    #[test]
    fn test_void_return() {
        let desc = MethodDescriptor::parse("()V").unwrap();
        assert!(desc.params.is_empty());
        assert_eq!(desc.ret, None);
    }

    #[test]
    fn test_invalid_descriptors() {
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("(Lfoo").is_err());
        assert!(MethodDescriptor::parse("(Q)V").is_err());
        assert!(FieldType::parse("II").is_err());
    }

    #[test]
    fn test_stack_kinds() {
        assert_eq!(FieldType::Boolean.stack_kind(), StackKind::Int);
        assert_eq!(FieldType::Double.stack_kind(), StackKind::Double);
        assert_eq!(FieldType::parse("[I").unwrap().stack_kind(), StackKind::Object);
        assert_eq!(FieldType::parse("[I").unwrap().class_name().as_deref(), Some("[I"));
    }
}
