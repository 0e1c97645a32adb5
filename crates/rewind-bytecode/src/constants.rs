//! Constant pool
//!
//! Strings, class names and member references used by instruction operands
//! are stored once per class file and referenced by `u32` index.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use rustc_hash::FxHashMap;

/// Reference to an instance field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Internal name of the declaring class
    pub owner: String,
    /// Field name
    pub name: String,
    /// Field descriptor, e.g. `I` or `Lrt/Counter;`
    pub descriptor: String,
}

impl FieldRef {
    /// Create a field reference
    pub fn new(owner: impl Into<String>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

/// Reference to a method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Internal name of the declaring class
    pub owner: String,
    /// Method name
    pub name: String,
    /// Method descriptor, e.g. `(I)V`
    pub descriptor: String,
}

impl MethodRef {
    /// Create a method reference
    pub fn new(owner: impl Into<String>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl std::fmt::Display for MethodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
    }
}

/// A single constant pool entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// String literal (`Ldc`)
    Str(String),
    /// Class name (`New`, `Checkcast`, `InstanceOf`, `Anewarray`)
    Class(String),
    /// Field reference (`GetField`, `PutField`)
    Field(FieldRef),
    /// Method reference (`Invoke*`)
    Method(MethodRef),
}

impl Constant {
    fn tag(&self) -> u8 {
        match self {
            Constant::Str(_) => 1,
            Constant::Class(_) => 2,
            Constant::Field(_) => 3,
            Constant::Method(_) => 4,
        }
    }

    /// Short name of the entry kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Constant::Str(_) => "string",
            Constant::Class(_) => "class",
            Constant::Field(_) => "field",
            Constant::Method(_) => "method",
        }
    }
}

/// Interning constant pool
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    index: FxHashMap<Constant, u32>,
}

impl ConstantPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Intern a constant, returning its index
    pub fn add(&mut self, constant: Constant) -> u32 {
        if let Some(&idx) = self.index.get(&constant) {
            return idx;
        }
        let idx = self.entries.len() as u32;
        self.index.insert(constant.clone(), idx);
        self.entries.push(constant);
        idx
    }

    /// Intern a string literal
    pub fn add_string(&mut self, value: &str) -> u32 {
        self.add(Constant::Str(value.to_string()))
    }

    /// Intern a class name
    pub fn add_class(&mut self, name: &str) -> u32 {
        self.add(Constant::Class(name.to_string()))
    }

    /// Get an entry by index
    pub fn get(&self, index: u32) -> Option<&Constant> {
        self.entries.get(index as usize)
    }

    /// Get a string literal by index
    pub fn get_string(&self, index: u32) -> Option<&str> {
        match self.get(index) {
            Some(Constant::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Get a class name by index
    pub fn get_class(&self, index: u32) -> Option<&str> {
        match self.get(index) {
            Some(Constant::Class(s)) => Some(s),
            _ => None,
        }
    }

    /// Get a field reference by index
    pub fn get_field(&self, index: u32) -> Option<&FieldRef> {
        match self.get(index) {
            Some(Constant::Field(f)) => Some(f),
            _ => None,
        }
    }

    /// Get a method reference by index
    pub fn get_method(&self, index: u32) -> Option<&MethodRef> {
        match self.get(index) {
            Some(Constant::Method(m)) => Some(m),
            _ => None,
        }
    }

    /// Iterate over all entries in index order
    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.entries.iter()
    }

    pub(crate) fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.entries.len() as u32);
        for entry in &self.entries {
            writer.emit_u8(entry.tag());
            match entry {
                Constant::Str(s) | Constant::Class(s) => writer.emit_string(s),
                Constant::Field(FieldRef { owner, name, descriptor })
                | Constant::Method(MethodRef { owner, name, descriptor }) => {
                    writer.emit_string(owner);
                    writer.emit_string(name);
                    writer.emit_string(descriptor);
                }
            }
        }
    }

    pub(crate) fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u32()? as usize;
        let mut pool = ConstantPool::new();
        for _ in 0..count {
            let offset = reader.position();
            let tag = reader.read_u8()?;
            let constant = match tag {
                1 => Constant::Str(reader.read_string()?),
                2 => Constant::Class(reader.read_string()?),
                3 => Constant::Field(FieldRef {
                    owner: reader.read_string()?,
                    name: reader.read_string()?,
                    descriptor: reader.read_string()?,
                }),
                4 => Constant::Method(MethodRef {
                    owner: reader.read_string()?,
                    name: reader.read_string()?,
                    descriptor: reader.read_string()?,
                }),
                _ => {
                    return Err(DecodeError::InvalidTag {
                        kind: "constant",
                        tag,
                        offset,
                    })
                }
            };
            // Pools are written deduplicated, so positions are preserved.
            pool.add(constant);
        }
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning() {
        let mut pool = ConstantPool::new();
        let a = pool.add_string("hello");
        let b = pool.add_class("hello");
        let c = pool.add_string("hello");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get_string(a), Some("hello"));
        assert_eq!(pool.get_class(b), Some("hello"));
        assert_eq!(pool.get_string(b), None);
    }

    #[test]
    fn test_pool_encoding() {
        let mut pool = ConstantPool::new();
        pool.add_string("x");
        let m = pool.add(Constant::Method(MethodRef::new("a/B", "run", "()V")));
        pool.add(Constant::Field(FieldRef::new("a/B", "count", "I")));

        let mut writer = BytecodeWriter::new();
        pool.encode(&mut writer);
        let bytes = writer.into_bytes();
        let decoded = ConstantPool::decode(&mut BytecodeReader::new(&bytes)).unwrap();

        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded.get_method(m).unwrap().to_string(), "a/B.run()V");
    }
}
