//! Object handlers: allocation, type checks, field access and invocation

use crate::builtins::{CLASS_CAST_EXCEPTION, NULL_POINTER_EXCEPTION};
use crate::error::{ContinuationError, EngineResult};
use crate::interpreter::execution::{Completion, OpcodeResult};
use crate::interpreter::frame::Frame;
use crate::interpreter::Interpreter;
use crate::value::Value;
use rewind_bytecode::{FieldRef, MethodRef, Opcode};

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_type_ops(
        &mut self,
        frame: &mut Frame,
        opcode: Opcode,
        class_name: &str,
    ) -> EngineResult<OpcodeResult> {
        match opcode {
            Opcode::New => {
                let object = self.loader.instantiate_named(class_name)?;
                frame.push(Value::object(object));
                Ok(OpcodeResult::Continue)
            }
            Opcode::Checkcast => {
                let object = match frame.peek()?.as_object()? {
                    Some(object) => object,
                    None => return Ok(OpcodeResult::Continue),
                };
                if self.loader.is_assignable(object.class_name(), class_name)? {
                    Ok(OpcodeResult::Continue)
                } else {
                    let message = format!("{} cannot be cast to {}", object.class_name(), class_name);
                    self.throw_new(CLASS_CAST_EXCEPTION, &message)
                }
            }
            Opcode::InstanceOf => {
                let result = match frame.pop_ref()? {
                    Some(object) => self.loader.is_assignable(object.class_name(), class_name)?,
                    None => false,
                };
                frame.push(Value::Int(i32::from(result)));
                Ok(OpcodeResult::Continue)
            }
            Opcode::Anewarray => self.exec_anewarray(frame, class_name),
            other => Err(ContinuationError::Execution(format!(
                "opcode {:?} does not take a class operand",
                other
            ))),
        }
    }

    pub(in crate::interpreter) fn exec_field_ops(
        &mut self,
        frame: &mut Frame,
        opcode: Opcode,
        field: &FieldRef,
    ) -> EngineResult<OpcodeResult> {
        match opcode {
            Opcode::GetField => {
                let object = match frame.pop_ref()? {
                    Some(object) => object,
                    None => {
                        let message = format!("read of {}.{} on null", field.owner, field.name);
                        return self.throw_new(NULL_POINTER_EXCEPTION, &message);
                    }
                };
                let value = object.get_field(&field.name).ok_or_else(|| {
                    ContinuationError::Execution(format!(
                        "{} has no field {}",
                        object.class_name(),
                        field.name
                    ))
                })?;
                frame.push(value);
            }
            Opcode::PutField => {
                let value = frame.pop()?;
                let object = match frame.pop_ref()? {
                    Some(object) => object,
                    None => {
                        let message = format!("write of {}.{} on null", field.owner, field.name);
                        return self.throw_new(NULL_POINTER_EXCEPTION, &message);
                    }
                };
                if !object.set_field(&field.name, value) {
                    return Err(ContinuationError::Execution(format!(
                        "{} has no field {}",
                        object.class_name(),
                        field.name
                    )));
                }
            }
            other => {
                return Err(ContinuationError::Execution(format!(
                    "opcode {:?} is not a field instruction",
                    other
                )))
            }
        }
        Ok(OpcodeResult::Continue)
    }

    pub(in crate::interpreter) fn exec_invoke(
        &mut self,
        frame: &mut Frame,
        opcode: Opcode,
        target: &MethodRef,
    ) -> EngineResult<OpcodeResult> {
        let owner = self.loader.load(&target.owner)?;
        let declared = owner
            .find_method(&target.name, &target.descriptor)
            .ok_or_else(|| {
                ContinuationError::NoSuchMethod(format!(
                    "{}.{}:{}",
                    target.owner, target.name, target.descriptor
                ))
            })?;

        let params = frame.pop_n(declared.signature.params.len())?;

        let (method, args) = match opcode {
            Opcode::InvokeStatic => {
                if !declared.is_static() {
                    return Err(ContinuationError::Execution(format!(
                        "static call to instance method {}",
                        declared.qualified_name()
                    )));
                }
                (declared, params)
            }
            Opcode::InvokeVirtual | Opcode::InvokeSpecial => {
                let receiver = match frame.pop_ref()? {
                    Some(receiver) => receiver,
                    None => {
                        let message = format!("call of {}.{} on null", target.owner, target.name);
                        return self.throw_new(NULL_POINTER_EXCEPTION, &message);
                    }
                };
                let method = if opcode == Opcode::InvokeVirtual && !receiver.class_name().starts_with('[') {
                    self.loader
                        .load(receiver.class_name())?
                        .find_method(&target.name, &target.descriptor)
                        .unwrap_or(declared)
                } else {
                    declared
                };
                let mut args = Vec::with_capacity(params.len() + 1);
                args.push(Value::object(receiver));
                args.extend(params);
                (method, args)
            }
            other => {
                return Err(ContinuationError::Execution(format!(
                    "opcode {:?} is not an invocation",
                    other
                )))
            }
        };

        match self.invoke(&method, args)? {
            Completion::Return(Some(value)) => {
                frame.push(value);
                Ok(OpcodeResult::Continue)
            }
            Completion::Return(None) => Ok(OpcodeResult::Continue),
            Completion::Throw(exception) => Ok(OpcodeResult::Throw(exception)),
            Completion::Suspend(suspension) => Ok(OpcodeResult::Suspend(suspension)),
        }
    }
}
