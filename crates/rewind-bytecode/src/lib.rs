//! Rewind bytecode
//!
//! The class-file model the continuations engine executes and rewrites:
//! opcodes, a symbolic instruction list with labels, binary encoding with
//! a CRC32-checked header, descriptors, an assembler and a structural
//! verifier.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod builder;
pub mod class;
pub mod code;
pub mod constants;
pub mod descriptor;
pub mod encoder;
pub mod insn;
pub mod opcode;
pub mod verify;

pub use builder::{ClassBuilder, MethodBuilder};
pub use class::{
    class_flags, method_flags, ClassError, ClassFile, ClassHeader, ClassReader, ExceptionHandler,
    FieldDef, MethodDef,
};
pub use code::{decode_code, encode_code, CodeBody, CodeError, HandlerBlock};
pub use constants::{Constant, ConstantPool, FieldRef, MethodRef};
pub use descriptor::{DescriptorError, FieldType, MethodDescriptor};
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use insn::{ArrayKind, ContInsn, Insn, Label, StackKind, SuspendKind};
pub use opcode::Opcode;
pub use verify::{verify_class, VerifyError};
