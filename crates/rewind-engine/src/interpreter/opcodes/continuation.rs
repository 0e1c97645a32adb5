//! Continuation instructions emitted by the rewriter
//!
//! These move state between the executing frame and the context of the
//! running continuable: the resume label, mirrored locals, saved operands,
//! and the suspension itself.

use crate::error::{ContinuationError, EngineResult};
use crate::interpreter::execution::{OpcodeResult, Suspension};
use crate::interpreter::frame::Frame;
use crate::interpreter::Interpreter;
use crate::value::Value;
use rewind_bytecode::{ContInsn, SuspendKind};

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_continuation_ops(
        &mut self,
        frame: &mut Frame,
        insn: &ContInsn,
    ) -> EngineResult<OpcodeResult> {
        if let ContInsn::Enter = insn {
            let this = frame.load(0)?.as_object()?.ok_or_else(|| {
                ContinuationError::Execution("continuation entry without a receiver".to_string())
            })?;
            let context = self.scope.create_or_reset(&this)?;
            tracing::trace!(id = %context.id(), label = context.label(), "continuation: enter");
            frame.context = Some(context);
            return Ok(OpcodeResult::Continue);
        }

        let context = frame.context()?;
        match insn {
            ContInsn::Enter => {}
            ContInsn::Exit => {
                context.register();
                self.scope.deactivate(&context);
                frame.context = None;
            }
            ContInsn::ReadLabel => frame.push(Value::Int(context.label())),
            ContInsn::SetLabel(label) => context.set_label(*label),
            ContInsn::ClearLabel => context.clear_label(),
            ContInsn::MirrorLocal(_, index) => {
                let value = frame.load(*index)?;
                context.local_vars().store(*index as usize, value);
            }
            ContInsn::MirrorIinc(index, delta) => {
                context.local_vars().increment_int(*index as usize, *delta as i32);
            }
            ContInsn::SaveStack(_) => {
                let value = frame.pop()?;
                context.local_stack().push(value);
            }
            ContInsn::RestoreStack(kind) => frame.push(context.local_stack().pop(*kind)),
            ContInsn::RestoreLocal(kind, index) => {
                frame.push(context.local_vars().get(*index as usize, *kind));
            }
            ContInsn::Suspend(kind) => {
                let value = match kind {
                    SuspendKind::Pause | SuspendKind::StepBack => {
                        context.set_paused(true);
                        None
                    }
                    SuspendKind::Call => {
                        let target = frame.pop()?;
                        context.set_paused(true);
                        Some(target)
                    }
                    SuspendKind::Answer => Some(frame.pop()?),
                };
                return Ok(OpcodeResult::Suspend(Suspension {
                    kind: *kind,
                    context,
                    value,
                }));
            }
            ContInsn::CallAnswer => frame.push(context.call_answer().unwrap_or(Value::NULL)),
        }
        Ok(OpcodeResult::Continue)
    }
}
