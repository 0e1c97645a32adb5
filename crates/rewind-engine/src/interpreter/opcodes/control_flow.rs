//! Control flow handlers: conditional jumps, Goto, TableSwitch, returns

use crate::error::{ContinuationError, EngineResult};
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::frame::Frame;
use crate::interpreter::Interpreter;
use crate::loader::MethodCode;
use rewind_bytecode::{Label, Opcode};

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_jump(
        &mut self,
        frame: &mut Frame,
        code: &MethodCode,
        opcode: Opcode,
        label: Label,
    ) -> EngineResult<OpcodeResult> {
        let taken = match opcode {
            Opcode::Goto => true,
            Opcode::Ifeq | Opcode::Ifne | Opcode::Iflt | Opcode::Ifge | Opcode::Ifgt | Opcode::Ifle => {
                let a = frame.pop_int()?;
                match opcode {
                    Opcode::Ifeq => a == 0,
                    Opcode::Ifne => a != 0,
                    Opcode::Iflt => a < 0,
                    Opcode::Ifge => a >= 0,
                    Opcode::Ifgt => a > 0,
                    _ => a <= 0,
                }
            }
            Opcode::IfIcmpeq
            | Opcode::IfIcmpne
            | Opcode::IfIcmplt
            | Opcode::IfIcmpge
            | Opcode::IfIcmpgt
            | Opcode::IfIcmple => {
                let b = frame.pop_int()?;
                let a = frame.pop_int()?;
                match opcode {
                    Opcode::IfIcmpeq => a == b,
                    Opcode::IfIcmpne => a != b,
                    Opcode::IfIcmplt => a < b,
                    Opcode::IfIcmpge => a >= b,
                    Opcode::IfIcmpgt => a > b,
                    _ => a <= b,
                }
            }
            Opcode::IfAcmpeq | Opcode::IfAcmpne => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                a.same(&b) == (opcode == Opcode::IfAcmpeq)
            }
            Opcode::Ifnull => frame.pop_ref()?.is_none(),
            Opcode::Ifnonnull => frame.pop_ref()?.is_some(),
            other => {
                return Err(ContinuationError::Execution(format!(
                    "opcode {:?} is not a jump",
                    other
                )))
            }
        };

        if taken {
            Ok(OpcodeResult::Jump(code.target(label)?))
        } else {
            Ok(OpcodeResult::Continue)
        }
    }

    pub(in crate::interpreter) fn exec_table_switch(
        &mut self,
        frame: &mut Frame,
        code: &MethodCode,
        low: i32,
        default: Label,
        targets: &[Label],
    ) -> EngineResult<OpcodeResult> {
        let key = frame.pop_int()?;
        let offset = key as i64 - low as i64;
        let label = usize::try_from(offset)
            .ok()
            .and_then(|i| targets.get(i).copied())
            .unwrap_or(default);
        Ok(OpcodeResult::Jump(code.target(label)?))
    }

    pub(in crate::interpreter) fn exec_return(
        &mut self,
        frame: &mut Frame,
        opcode: Opcode,
    ) -> EngineResult<OpcodeResult> {
        if opcode == Opcode::Return {
            return Ok(OpcodeResult::Return(None));
        }
        let value = frame.pop()?;
        Ok(OpcodeResult::Return(Some(value)))
    }
}
