//! Local variable handlers: typed loads and stores, Iinc

use crate::error::{ContinuationError, EngineResult};
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::frame::Frame;
use crate::interpreter::Interpreter;
use crate::value::Value;
use rewind_bytecode::Opcode;

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_variable_ops(
        &mut self,
        frame: &mut Frame,
        opcode: Opcode,
        index: u16,
    ) -> EngineResult<OpcodeResult> {
        match opcode {
            Opcode::Iload | Opcode::Lload | Opcode::Fload | Opcode::Dload | Opcode::Aload => {
                let value = frame.load(index)?;
                frame.push(value);
            }
            Opcode::Istore => {
                let value = frame.pop_int()?;
                frame.store(index, Value::Int(value))?;
            }
            Opcode::Lstore => {
                let value = frame.pop_long()?;
                frame.store(index, Value::Long(value))?;
            }
            Opcode::Fstore => {
                let value = frame.pop_float()?;
                frame.store(index, Value::Float(value))?;
            }
            Opcode::Dstore => {
                let value = frame.pop_double()?;
                frame.store(index, Value::Double(value))?;
            }
            Opcode::Astore => {
                let value = frame.pop_ref()?;
                frame.store(index, Value::Ref(value))?;
            }
            other => {
                return Err(ContinuationError::Execution(format!(
                    "opcode {:?} is not a local variable instruction",
                    other
                )))
            }
        }
        Ok(OpcodeResult::Continue)
    }

    pub(in crate::interpreter) fn exec_iinc(
        &mut self,
        frame: &mut Frame,
        index: u16,
        delta: i16,
    ) -> EngineResult<OpcodeResult> {
        let value = frame.load(index)?.as_int()?;
        frame.store(index, Value::Int(value.wrapping_add(delta as i32)))?;
        Ok(OpcodeResult::Continue)
    }
}
