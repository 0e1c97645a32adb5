//! Array handlers: allocation, length, element loads and stores

use crate::builtins::{INDEX_EXCEPTION, NULL_POINTER_EXCEPTION};
use crate::error::{ContinuationError, EngineResult};
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::frame::Frame;
use crate::interpreter::Interpreter;
use crate::types::array_of;
use crate::value::{ArrayData, ObjectData, ObjectRef, Value};
use rewind_bytecode::{ArrayKind, Opcode, StackKind};

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_new_array(
        &mut self,
        frame: &mut Frame,
        kind: ArrayKind,
    ) -> EngineResult<OpcodeResult> {
        let count = frame.pop_int()?;
        if count < 0 {
            return self.throw_new(INDEX_EXCEPTION, &format!("negative array size {}", count));
        }
        let data = ArrayData::zeroed(kind.element_kind(), count as usize);
        frame.push(Value::object(ObjectRef::new_array(kind.descriptor(), data)));
        Ok(OpcodeResult::Continue)
    }

    pub(in crate::interpreter) fn exec_anewarray(
        &mut self,
        frame: &mut Frame,
        element: &str,
    ) -> EngineResult<OpcodeResult> {
        let count = frame.pop_int()?;
        if count < 0 {
            return self.throw_new(INDEX_EXCEPTION, &format!("negative array size {}", count));
        }
        let data = ArrayData::zeroed(StackKind::Object, count as usize);
        frame.push(Value::object(ObjectRef::new_array(array_of(element), data)));
        Ok(OpcodeResult::Continue)
    }

    pub(in crate::interpreter) fn exec_array_ops(
        &mut self,
        frame: &mut Frame,
        opcode: Opcode,
    ) -> EngineResult<OpcodeResult> {
        match opcode {
            Opcode::ArrayLength => {
                let array = match frame.pop_ref()? {
                    Some(array) => array,
                    None => return self.throw_new(NULL_POINTER_EXCEPTION, "length of null array"),
                };
                let len = match &*array.lock() {
                    ObjectData::Array(data) => data.len(),
                    _ => return Err(not_an_array(&array)),
                };
                frame.push(Value::Int(len as i32));
                Ok(OpcodeResult::Continue)
            }
            Opcode::Iaload | Opcode::Laload | Opcode::Faload | Opcode::Daload | Opcode::Aaload => {
                let index = frame.pop_int()?;
                let array = match frame.pop_ref()? {
                    Some(array) => array,
                    None => return self.throw_new(NULL_POINTER_EXCEPTION, "load from null array"),
                };
                let element = match &*array.lock() {
                    ObjectData::Array(data) => usize::try_from(index).ok().and_then(|i| data.get(i)),
                    _ => return Err(not_an_array(&array)),
                };
                match element {
                    Some(value) => {
                        frame.push(value);
                        Ok(OpcodeResult::Continue)
                    }
                    None => self.throw_new(INDEX_EXCEPTION, &format!("index {} out of bounds", index)),
                }
            }
            Opcode::Iastore | Opcode::Lastore | Opcode::Fastore | Opcode::Dastore | Opcode::Aastore => {
                let value = frame.pop()?;
                let index = frame.pop_int()?;
                let array = match frame.pop_ref()? {
                    Some(array) => array,
                    None => return self.throw_new(NULL_POINTER_EXCEPTION, "store into null array"),
                };
                let stored = match &mut *array.lock() {
                    ObjectData::Array(data) => match usize::try_from(index) {
                        Ok(i) => data.set(i, value)?,
                        Err(_) => false,
                    },
                    _ => return Err(not_an_array(&array)),
                };
                if stored {
                    Ok(OpcodeResult::Continue)
                } else {
                    self.throw_new(INDEX_EXCEPTION, &format!("index {} out of bounds", index))
                }
            }
            other => Err(ContinuationError::Execution(format!(
                "opcode {:?} is not an array instruction",
                other
            ))),
        }
    }
}

fn not_an_array(object: &ObjectRef) -> ContinuationError {
    ContinuationError::Execution(format!("{} is not an array", object.class_name()))
}
