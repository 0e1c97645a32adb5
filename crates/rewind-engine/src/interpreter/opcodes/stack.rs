//! Operand stack manipulation: Pop, Pop2, Dup, DupX1, DupX2, Dup2, Swap
//!
//! Longs and doubles occupy a single operand, so the two-slot forms only
//! act on a second operand when the first is not wide.

use crate::error::{ContinuationError, EngineResult};
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::frame::Frame;
use crate::interpreter::Interpreter;
use rewind_bytecode::Opcode;

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_stack_ops(
        &mut self,
        frame: &mut Frame,
        opcode: Opcode,
    ) -> EngineResult<OpcodeResult> {
        match opcode {
            Opcode::Pop => {
                frame.pop()?;
            }
            Opcode::Pop2 => {
                if !frame.pop()?.kind().is_wide() {
                    frame.pop()?;
                }
            }
            Opcode::Dup => {
                let top = frame.peek()?.clone();
                frame.push(top);
            }
            Opcode::DupX1 => {
                let a = frame.pop()?;
                let b = frame.pop()?;
                frame.stack.extend([a.clone(), b, a]);
            }
            Opcode::DupX2 => {
                let a = frame.pop()?;
                let b = frame.pop()?;
                if b.kind().is_wide() {
                    frame.stack.extend([a.clone(), b, a]);
                } else {
                    let c = frame.pop()?;
                    frame.stack.extend([a.clone(), c, b, a]);
                }
            }
            Opcode::Dup2 => {
                let a = frame.pop()?;
                if a.kind().is_wide() {
                    frame.stack.extend([a.clone(), a]);
                } else {
                    let b = frame.pop()?;
                    frame.stack.extend([b.clone(), a.clone(), b, a]);
                }
            }
            Opcode::Swap => {
                let a = frame.pop()?;
                let b = frame.pop()?;
                frame.stack.extend([a, b]);
            }
            other => {
                return Err(ContinuationError::Execution(format!(
                    "opcode {:?} is not a stack instruction",
                    other
                )))
            }
        }
        Ok(OpcodeResult::Continue)
    }
}
