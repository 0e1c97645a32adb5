//! Binary class file format
//!
//! Layout:
//! - Header: magic `RWND` (4 bytes) + version (u32) + checksum (u32)
//! - Payload (covered by the CRC32 checksum):
//!   - class flags (u32), class name, optional super name, interfaces
//!   - constant pool
//!   - fields
//!   - methods, each with its code bytes and exception table
//!
//! The class name, super name and interfaces precede the constant pool so
//! that [`ClassReader::read_header`] can inspect a class without touching
//! method bodies.

use crate::code::{decode_code, encode_code, CodeBody, CodeError};
use crate::constants::ConstantPool;
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use thiserror::Error;

/// Magic number for Rewind class files: "RWND"
pub const MAGIC: [u8; 4] = *b"RWND";

/// Current class file version
pub const VERSION: u32 = 1;

const HEADER_LEN: usize = 12;

/// Class-level flags
pub mod class_flags {
    /// Public class
    pub const PUBLIC: u32 = 0x0001;
    /// Interface (no code, only declarations)
    pub const INTERFACE: u32 = 0x0200;
    /// Abstract class
    pub const ABSTRACT: u32 = 0x0400;
    /// Instances support deep cloning
    pub const CLONEABLE: u32 = 0x1000;
    /// Bodies have already been rewritten for continuations
    pub const INSTRUMENTED: u32 = 0x4000;
}

/// Method-level flags
pub mod method_flags {
    /// Public method
    pub const PUBLIC: u16 = 0x0001;
    /// Static method (no receiver in local 0)
    pub const STATIC: u16 = 0x0008;
    /// Implemented by the native registry
    pub const NATIVE: u16 = 0x0100;
    /// Declared without a body
    pub const ABSTRACT: u16 = 0x0400;
}

/// Class file errors
#[derive(Debug, Error)]
pub enum ClassError {
    /// Malformed bytes
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Bad method code
    #[error("Code error in {method}: {source}")]
    Code {
        /// `name + descriptor` of the method
        method: String,
        /// Underlying error
        #[source]
        source: CodeError,
    },

    /// Invalid magic number
    #[error("Invalid magic number: expected RWND, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Stored checksum
        expected: u32,
        /// Computed checksum
        actual: u32,
    },
}

/// Exception table entry, in byte offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First covered byte
    pub start_pc: u32,
    /// End of the covered range (exclusive)
    pub end_pc: u32,
    /// Handler entry point
    pub handler_pc: u32,
    /// Caught class, `None` catches everything
    pub catch_type: Option<String>,
}

/// Instance field declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field flags
    pub flags: u16,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
}

/// Method declaration with its code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    /// Method flags, see [`method_flags`]
    pub flags: u16,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Number of local variable slots, including the receiver and arguments
    pub max_locals: u16,
    /// Code bytes
    pub code: Vec<u8>,
    /// Exception table
    pub handlers: Vec<ExceptionHandler>,
}

impl MethodDef {
    /// Whether the method has no receiver
    pub fn is_static(&self) -> bool {
        self.flags & method_flags::STATIC != 0
    }

    /// Whether the method is implemented natively
    pub fn is_native(&self) -> bool {
        self.flags & method_flags::NATIVE != 0
    }

    /// Whether the method is declared without a body
    pub fn is_abstract(&self) -> bool {
        self.flags & method_flags::ABSTRACT != 0
    }

    /// Decode this method's code into a symbolic body
    pub fn body(&self, pool: &ConstantPool) -> Result<CodeBody, ClassError> {
        decode_code(&self.code, &self.handlers, pool).map_err(|source| ClassError::Code {
            method: format!("{}{}", self.name, self.descriptor),
            source,
        })
    }

    /// Replace this method's code with an encoded symbolic body
    pub fn set_body(&mut self, body: &CodeBody, pool: &mut ConstantPool) -> Result<(), ClassError> {
        let (code, handlers) = encode_code(body, pool).map_err(|source| ClassError::Code {
            method: format!("{}{}", self.name, self.descriptor),
            source,
        })?;
        self.code = code;
        self.handlers = handlers;
        Ok(())
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u16(self.flags);
        writer.emit_string(&self.name);
        writer.emit_string(&self.descriptor);
        writer.emit_u16(self.max_locals);
        writer.emit_u32(self.code.len() as u32);
        writer.emit_bytes(&self.code);
        writer.emit_u32(self.handlers.len() as u32);
        for h in &self.handlers {
            writer.emit_u32(h.start_pc);
            writer.emit_u32(h.end_pc);
            writer.emit_u32(h.handler_pc);
            emit_optional_string(writer, h.catch_type.as_deref());
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let flags = reader.read_u16()?;
        let name = reader.read_string()?;
        let descriptor = reader.read_string()?;
        let max_locals = reader.read_u16()?;
        let code_len = reader.read_u32()? as usize;
        let code = reader.read_bytes(code_len)?;
        let handler_count = reader.read_u32()? as usize;
        let mut handlers = Vec::with_capacity(handler_count.min(reader.remaining() / 13));
        for _ in 0..handler_count {
            handlers.push(ExceptionHandler {
                start_pc: reader.read_u32()?,
                end_pc: reader.read_u32()?,
                handler_pc: reader.read_u32()?,
                catch_type: read_optional_string(reader)?,
            });
        }
        Ok(Self {
            flags,
            name,
            descriptor,
            max_locals,
            code,
            handlers,
        })
    }
}

/// A complete class file
#[derive(Debug, Clone)]
pub struct ClassFile {
    /// Class flags, see [`class_flags`]
    pub flags: u32,
    /// Internal class name, e.g. `app/Counter`
    pub name: String,
    /// Super class name, `None` for root classes
    pub super_name: Option<String>,
    /// Implemented interface names
    pub interfaces: Vec<String>,
    /// Constant pool shared by all method bodies
    pub constants: ConstantPool,
    /// Instance fields
    pub fields: Vec<FieldDef>,
    /// Methods
    pub methods: Vec<MethodDef>,
}

impl ClassFile {
    /// Create an empty class
    pub fn new(name: impl Into<String>, super_name: Option<String>) -> Self {
        Self {
            flags: class_flags::PUBLIC,
            name: name.into(),
            super_name,
            interfaces: Vec::new(),
            constants: ConstantPool::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Whether instances may be deep-cloned
    pub fn is_cloneable(&self) -> bool {
        self.flags & class_flags::CLONEABLE != 0
    }

    /// Whether the class is an interface
    pub fn is_interface(&self) -> bool {
        self.flags & class_flags::INTERFACE != 0
    }

    /// Find a method by name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Find a method by name and descriptor, mutably
    pub fn find_method_mut(&mut self, name: &str, descriptor: &str) -> Option<&mut MethodDef> {
        self.methods
            .iter_mut()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Encode to binary, computing the checksum
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();
        writer.emit_bytes(&MAGIC);
        writer.emit_u32(VERSION);
        let checksum_offset = writer.offset();
        writer.emit_u32(0);

        writer.emit_u32(self.flags);
        writer.emit_string(&self.name);
        emit_optional_string(&mut writer, self.super_name.as_deref());
        writer.emit_u32(self.interfaces.len() as u32);
        for iface in &self.interfaces {
            writer.emit_string(iface);
        }

        self.constants.encode(&mut writer);

        writer.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            writer.emit_u16(field.flags);
            writer.emit_string(&field.name);
            writer.emit_string(&field.descriptor);
        }

        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            method.encode(&mut writer);
        }

        let checksum = crc32fast::hash(&writer.buffer()[HEADER_LEN..]);
        writer.patch_u32(checksum_offset, checksum);
        writer.into_bytes()
    }

    /// Decode from binary, validating magic, version and checksum
    pub fn decode(data: &[u8]) -> Result<Self, ClassError> {
        let mut reader = BytecodeReader::new(data);
        let header = read_header_fields(&mut reader, Some(data))?;

        let constants = ConstantPool::decode(&mut reader)?;

        let field_count = reader.read_u32()? as usize;
        let mut fields = Vec::with_capacity(field_count.min(reader.remaining()));
        for _ in 0..field_count {
            fields.push(FieldDef {
                flags: reader.read_u16()?,
                name: reader.read_string()?,
                descriptor: reader.read_string()?,
            });
        }

        let method_count = reader.read_u32()? as usize;
        let mut methods = Vec::with_capacity(method_count.min(reader.remaining()));
        for _ in 0..method_count {
            methods.push(MethodDef::decode(&mut reader)?);
        }

        Ok(Self {
            flags: header.flags,
            name: header.name,
            super_name: header.super_name,
            interfaces: header.interfaces,
            constants,
            fields,
            methods,
        })
    }
}

/// The identifying part of a class file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    /// Class flags
    pub flags: u32,
    /// Internal class name
    pub name: String,
    /// Super class name
    pub super_name: Option<String>,
    /// Implemented interface names
    pub interfaces: Vec<String>,
}

/// Header-only class reader
pub struct ClassReader;

impl ClassReader {
    /// Read name, super class, interfaces and flags without decoding the
    /// constant pool or any method body. The checksum is not verified.
    pub fn read_header(data: &[u8]) -> Result<ClassHeader, ClassError> {
        let mut reader = BytecodeReader::new(data);
        read_header_fields(&mut reader, None)
    }
}

fn read_header_fields(
    reader: &mut BytecodeReader<'_>,
    verify_checksum: Option<&[u8]>,
) -> Result<ClassHeader, ClassError> {
    let magic = reader.read_bytes(4)?;
    let magic = [magic[0], magic[1], magic[2], magic[3]];
    if magic != MAGIC {
        return Err(ClassError::InvalidMagic(magic));
    }
    let version = reader.read_u32()?;
    if version != VERSION {
        return Err(ClassError::UnsupportedVersion(version));
    }
    let stored = reader.read_u32()?;
    if let Some(data) = verify_checksum {
        let actual = crc32fast::hash(&data[HEADER_LEN..]);
        if actual != stored {
            return Err(ClassError::ChecksumMismatch {
                expected: stored,
                actual,
            });
        }
    }

    let flags = reader.read_u32()?;
    let name = reader.read_string()?;
    let super_name = read_optional_string(reader)?;
    let count = reader.read_u32()? as usize;
    let mut interfaces = Vec::with_capacity(count.min(reader.remaining() / 4));
    for _ in 0..count {
        interfaces.push(reader.read_string()?);
    }
    Ok(ClassHeader {
        flags,
        name,
        super_name,
        interfaces,
    })
}

fn emit_optional_string(writer: &mut BytecodeWriter, value: Option<&str>) {
    match value {
        Some(s) => {
            writer.emit_u8(1);
            writer.emit_string(s);
        }
        None => writer.emit_u8(0),
    }
}

fn read_optional_string(reader: &mut BytecodeReader<'_>) -> Result<Option<String>, DecodeError> {
    if reader.read_u8()? != 0 {
        Ok(Some(reader.read_string()?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClassFile {
        let mut class = ClassFile::new("app/Counter", Some("rt/Object".to_string()));
        class.interfaces.push("rt/Continuable".to_string());
        class.flags |= class_flags::CLONEABLE;
        class.fields.push(FieldDef {
            flags: 0,
            name: "count".to_string(),
            descriptor: "I".to_string(),
        });
        class.methods.push(MethodDef {
            flags: method_flags::PUBLIC,
            name: "execute".to_string(),
            descriptor: "()V".to_string(),
            max_locals: 1,
            code: vec![crate::Opcode::Return.to_u8()],
            handlers: Vec::new(),
        });
        class
    }

    #[test]
    fn test_class_encoding() {
        let bytes = sample().encode();
        assert_eq!(&bytes[0..4], b"RWND");

        let decoded = ClassFile::decode(&bytes).unwrap();
        assert_eq!(decoded.name, "app/Counter");
        assert_eq!(decoded.super_name.as_deref(), Some("rt/Object"));
        assert_eq!(decoded.interfaces, vec!["rt/Continuable".to_string()]);
        assert!(decoded.is_cloneable());
        assert_eq!(decoded.fields.len(), 1);
        assert!(decoded.find_method("execute", "()V").is_some());
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut bytes = sample().encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            ClassFile::decode(&bytes),
            Err(ClassError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = sample().encode();
        bytes[0] = b'X';
        assert!(matches!(
            ClassReader::read_header(&bytes),
            Err(ClassError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_header_only() {
        let bytes = sample().encode();
        // 12 byte prefix, flags, name, super, interface count, one interface
        let header_len = 12 + 4 + (4 + 11) + (1 + 4 + 9) + 4 + (4 + 14);
        let header = ClassReader::read_header(&bytes[..header_len]).unwrap();
        assert_eq!(header.name, "app/Counter");
        assert_eq!(header.interfaces.len(), 1);
    }
}
