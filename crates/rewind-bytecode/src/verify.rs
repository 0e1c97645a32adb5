//! Structural verification of class files
//!
//! Checks performed per method:
//! - code decodes (valid opcodes, constant kinds, jump targets on boundaries)
//! - every local index is below `max_locals`
//! - arguments (plus the receiver) fit in `max_locals`
//! - handler ranges are non-empty and ordered
//! - execution cannot fall off the end of the code
//! - descriptors parse

use crate::class::{ClassError, ClassFile, MethodDef};
use crate::descriptor::{DescriptorError, FieldType, MethodDescriptor};
use crate::insn::{ContInsn, Insn};

/// Verification errors
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Method code is malformed
    #[error(transparent)]
    Class(#[from] ClassError),

    /// Descriptor doesn't parse
    #[error("Bad descriptor in {method}: {source}")]
    Descriptor {
        /// Method containing the descriptor
        method: String,
        /// Parse error
        #[source]
        source: DescriptorError,
    },

    /// Local index out of range
    #[error("Invalid local variable reference in {method}: index {index} (max {max})")]
    InvalidLocalRef {
        /// Method name and descriptor
        method: String,
        /// Referenced index
        index: u16,
        /// `max_locals`
        max: u16,
    },

    /// Arguments don't fit in the locals
    #[error("{method} declares {needed} argument slots but max_locals is {max}")]
    TooFewLocals {
        /// Method name and descriptor
        method: String,
        /// Slots needed by receiver and arguments
        needed: usize,
        /// `max_locals`
        max: u16,
    },

    /// Handler range is empty or inverted
    #[error("Invalid exception handler range in {0}")]
    InvalidHandlerRange(String),

    /// Execution falls off the end of the code
    #[error("Execution falls off end of {0}")]
    FallOffEnd(String),

    /// Concrete method without code, or abstract/native method with code
    #[error("Method {0} has an unexpected body")]
    BodyMismatch(String),
}

/// Verify every method of a class
pub fn verify_class(class: &ClassFile) -> Result<(), VerifyError> {
    for field in &class.fields {
        FieldType::parse(&field.descriptor).map_err(|source| VerifyError::Descriptor {
            method: format!("{}.{}", class.name, field.name),
            source,
        })?;
    }
    for method in &class.methods {
        verify_method(class, method)?;
    }
    Ok(())
}

fn verify_method(class: &ClassFile, method: &MethodDef) -> Result<(), VerifyError> {
    let id = format!("{}.{}{}", class.name, method.name, method.descriptor);
    let descriptor_error = |source: DescriptorError| VerifyError::Descriptor {
        method: id.clone(),
        source,
    };

    let desc = MethodDescriptor::parse(&method.descriptor).map_err(descriptor_error)?;
    let needed = desc.arg_count() + usize::from(!method.is_static());
    if needed > method.max_locals as usize {
        return Err(VerifyError::TooFewLocals {
            method: id.clone(),
            needed,
            max: method.max_locals,
        });
    }

    let bodyless = method.is_abstract() || method.is_native();
    if bodyless != method.code.is_empty() {
        return Err(VerifyError::BodyMismatch(id.clone()));
    }
    if bodyless {
        return Ok(());
    }

    let body = method.body(&class.constants)?;
    let check_local = |index: u16| {
        if index >= method.max_locals {
            Err(VerifyError::InvalidLocalRef {
                method: id.clone(),
                index,
                max: method.max_locals,
            })
        } else {
            Ok(())
        }
    };

    for insn in &body.insns {
        match insn {
            Insn::Var(_, index)
            | Insn::Iinc { index, .. }
            | Insn::Cont(ContInsn::MirrorLocal(_, index))
            | Insn::Cont(ContInsn::MirrorIinc(index, _))
            | Insn::Cont(ContInsn::RestoreLocal(_, index)) => check_local(*index)?,
            Insn::Invoke(_, target) => {
                MethodDescriptor::parse(&target.descriptor).map_err(descriptor_error)?;
            }
            Insn::Field(_, field) => {
                FieldType::parse(&field.descriptor).map_err(descriptor_error)?;
            }
            _ => {}
        }
    }

    let positions = body.label_positions();
    for handler in &body.handlers {
        let start = positions.get(&handler.start);
        let end = positions.get(&handler.end);
        match (start, end) {
            (Some(s), Some(e)) if s < e => {}
            _ => return Err(VerifyError::InvalidHandlerRange(id.clone())),
        }
    }

    let last = body.insns.iter().rev().find(|i| !matches!(i, Insn::Label(_)));
    match last {
        Some(insn) if insn.is_terminator() => Ok(()),
        _ => Err(VerifyError::FallOffEnd(id.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ClassBuilder;
    use crate::opcode::Opcode;

    #[test]
    fn test_verify_simple_class() {
        let mut class = ClassBuilder::new("app/Ok");
        let mut m = class.method("run", "(I)I");
        m.max_locals(2).iload(1).op(Opcode::Ireturn);
        class.add_method(m).unwrap();
        assert!(verify_class(&class.build()).is_ok());
    }

    #[test]
    fn test_verify_invalid_local_ref() {
        let mut class = ClassBuilder::new("app/Bad");
        let mut m = class.method("run", "()V");
        m.max_locals(1).iconst(1).istore(4).op(Opcode::Return);
        class.add_method(m).unwrap();
        assert!(matches!(
            verify_class(&class.build()),
            Err(VerifyError::InvalidLocalRef { index: 4, .. })
        ));
    }

    #[test]
    fn test_verify_fall_off_end() {
        let mut class = ClassBuilder::new("app/Bad");
        let mut m = class.method("run", "()V");
        m.iconst(1).op(Opcode::Pop);
        class.add_method(m).unwrap();
        assert!(matches!(
            verify_class(&class.build()),
            Err(VerifyError::FallOffEnd(_))
        ));
    }

    #[test]
    fn test_verify_too_few_locals() {
        let mut class = ClassBuilder::new("app/Bad");
        let mut m = class.method("run", "(IJ)V");
        m.max_locals(2).op(Opcode::Return);
        class.add_method(m).unwrap();
        assert!(matches!(
            verify_class(&class.build()),
            Err(VerifyError::TooFewLocals { needed: 3, .. })
        ));
    }

    #[test]
    fn test_verify_bad_invoke_descriptor() {
        let mut class = ClassBuilder::new("app/Bad");
        let mut m = class.method("run", "()V");
        m.invoke_static("rt/Strings", "x", "(Q)V").op(Opcode::Return);
        class.add_method(m).unwrap();
        assert!(matches!(
            verify_class(&class.build()),
            Err(VerifyError::Descriptor { .. })
        ));
    }
}
