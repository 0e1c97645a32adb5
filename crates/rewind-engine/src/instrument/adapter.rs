//! Rewrite of the entry method into a resumable state machine
//!
//! The rewritten body opens the context, reads its resume label and
//! table-switches to the matching resume point. Every local store is mirrored
//! into the context. Each suspension call is replaced by code that saves the
//! live operands, records the label and suspends; the code after the resume
//! label restores locals and operands from the context.

use super::config::InstrumentConfig;
use crate::error::{ContinuationError, EngineResult};
use crate::types::{analyze_method, MethodTypes, SlotType, SuspendPoint, OBJECT_CLASS};
use rewind_bytecode::{
    class_flags, ClassFile, CodeBody, ContInsn, Insn, Label, MethodDef, Opcode, StackKind, SuspendKind,
};
use rustc_hash::FxHashSet;

const VOID_DESCRIPTOR: &str = "()V";

#[derive(Clone, Copy)]
struct CallShape {
    has_receiver: bool,
    takes_value: bool,
}

/// Rewrites the entry method of continuable classes
pub struct ResumableAdapter<'a> {
    config: &'a dyn InstrumentConfig,
}

fn store_kind(op: Opcode) -> Option<StackKind> {
    match op {
        Opcode::Istore => Some(StackKind::Int),
        Opcode::Lstore => Some(StackKind::Long),
        Opcode::Fstore => Some(StackKind::Float),
        Opcode::Dstore => Some(StackKind::Double),
        Opcode::Astore => Some(StackKind::Object),
        _ => None,
    }
}

/// Locals the body writes; the others keep their entry values on resume
fn written_locals(body: &CodeBody) -> FxHashSet<u16> {
    body.insns
        .iter()
        .filter_map(|insn| match insn {
            Insn::Var(op, index) if store_kind(*op).is_some() => Some(*index),
            Insn::Iinc { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

impl<'a> ResumableAdapter<'a> {
    /// Create an adapter for the given naming contract
    pub fn new(config: &'a dyn InstrumentConfig) -> Self {
        Self { config }
    }

    /// Suspension flavor of an instruction in a method of `class_name`
    pub fn classify(&self, class_name: &str, insn: &Insn) -> Option<SuspendKind> {
        let Insn::Invoke(_, target) = insn else {
            return None;
        };
        let owner = target.owner.as_str();
        if owner != class_name && self.config.support_class() != Some(owner) {
            return None;
        }
        let name = Some(target.name.as_str());
        let desc = target.descriptor.as_str();

        if name == self.config.pause_method_name() && desc == VOID_DESCRIPTOR {
            Some(SuspendKind::Pause)
        } else if name == self.config.step_back_method_name() && desc == VOID_DESCRIPTOR {
            Some(SuspendKind::StepBack)
        } else if name == self.config.call_method_name() && desc == self.config.call_method_descriptor() {
            Some(SuspendKind::Call)
        } else if name == self.config.answer_method_name()
            && (desc == VOID_DESCRIPTOR || desc == format!("(L{};)V", OBJECT_CLASS))
        {
            Some(SuspendKind::Answer)
        } else {
            None
        }
    }

    fn entry_method<'c>(&self, class: &'c ClassFile) -> Option<&'c MethodDef> {
        class
            .find_method(self.config.entry_method_name(), self.config.entry_method_descriptor())
            .filter(|m| !m.is_native() && !m.is_abstract())
    }

    /// Type analysis of the entry method, `None` if the class has none
    pub fn analyze_entry(&self, class: &ClassFile) -> EngineResult<Option<MethodTypes>> {
        let Some(method) = self.entry_method(class) else {
            return Ok(None);
        };
        let body = method.body(&class.constants)?;
        let classify = |insn: &Insn| self.classify(&class.name, insn);
        analyze_method(&class.name, method, &body, &classify).map(Some)
    }

    /// Rewrite the entry method in place and flag the class as instrumented
    ///
    /// Returns `false` when the class declares no entry method.
    pub fn adapt_class(&self, class: &mut ClassFile) -> EngineResult<bool> {
        let Some(method) = self.entry_method(class) else {
            tracing::debug!(class = %class.name, "instrument: no entry method declared");
            return Ok(false);
        };
        let body = method.body(&class.constants)?;
        let classify = |insn: &Insn| self.classify(&class.name, insn);
        let types = analyze_method(&class.name, method, &body, &classify)?;
        let (rewritten, max_locals) = self.rewrite(method, body, &types)?;

        let name = self.config.entry_method_name().to_string();
        let descriptor = self.config.entry_method_descriptor().to_string();
        let ClassFile {
            methods, constants, ..
        } = &mut *class;
        if let Some(method) = methods
            .iter_mut()
            .find(|m| m.name == name && m.descriptor == descriptor)
        {
            method.set_body(&rewritten, constants)?;
            method.max_locals = max_locals;
        }
        class.flags |= class_flags::INSTRUMENTED;
        tracing::debug!(
            class = %class.name,
            points = types.points.len(),
            labels = types.label_count(),
            "instrument: entry method rewritten"
        );
        Ok(true)
    }

    fn rewrite(
        &self,
        method: &MethodDef,
        mut body: CodeBody,
        types: &MethodTypes,
    ) -> EngineResult<(CodeBody, u16)> {
        let fail = |reason: String| ContinuationError::Instrumentation {
            method: types.method.clone(),
            reason,
        };

        let start = body.new_label();
        let resume_labels: Vec<Label> = (0..types.label_count()).map(|_| body.new_label()).collect();
        let written = written_locals(&body);

        let needs_temp = types.points.iter().any(|p| p.kind == SuspendKind::Call);
        let temp = method.max_locals;
        let max_locals = if needs_temp {
            method
                .max_locals
                .checked_add(1)
                .ok_or_else(|| fail("no room for the call target local".into()))?
        } else {
            method.max_locals
        };

        let mut out = Vec::with_capacity(body.insns.len() * 2 + 4);
        out.push(Insn::Cont(ContInsn::Enter));
        if !resume_labels.is_empty() {
            out.push(Insn::Cont(ContInsn::ReadLabel));
            out.push(Insn::TableSwitch {
                low: 0,
                default: start,
                targets: resume_labels.clone(),
            });
        }
        out.push(Insn::Label(start));

        for (index, insn) in body.insns.iter().enumerate() {
            if let Some(point) = types.point_at(index) {
                let Insn::Invoke(op, target) = insn else {
                    return Err(fail(format!("suspension point {} is not an invocation", index)));
                };
                let call = CallShape {
                    has_receiver: *op != Opcode::InvokeStatic,
                    takes_value: target.descriptor != VOID_DESCRIPTOR,
                };
                let resume = match point.label {
                    Some(label) => Some(
                        *resume_labels
                            .get(label as usize)
                            .ok_or_else(|| fail(format!("resume label {} out of range", label)))?,
                    ),
                    None => None,
                };
                tracing::trace!(method = %types.method, index, kind = point.kind.name(), "instrument: suspension");
                self.emit_suspension(&mut out, point, call, resume, temp, &written);
                continue;
            }

            match insn {
                Insn::Var(op, local) => {
                    out.push(insn.clone());
                    if let Some(kind) = store_kind(*op) {
                        out.push(Insn::Cont(ContInsn::MirrorLocal(kind, *local)));
                    }
                }
                Insn::Iinc { index, delta } => {
                    out.push(insn.clone());
                    out.push(Insn::Cont(ContInsn::MirrorIinc(*index, *delta)));
                }
                Insn::Simple(op) if op.is_return() => {
                    out.push(Insn::Cont(ContInsn::Exit));
                    out.push(insn.clone());
                }
                _ => out.push(insn.clone()),
            }
        }

        let handlers = std::mem::take(&mut body.handlers);
        Ok((CodeBody::from_insns(out, handlers), max_locals))
    }

    fn emit_suspension(
        &self,
        out: &mut Vec<Insn>,
        point: &SuspendPoint,
        call: CallShape,
        resume: Option<Label>,
        temp: u16,
        written: &FxHashSet<u16>,
    ) {
        match point.kind {
            SuspendKind::Pause | SuspendKind::StepBack => {
                if call.has_receiver {
                    out.push(Insn::Simple(Opcode::Pop));
                }
                save_operands(out, &point.stack);
                if let Some(label) = point.label {
                    out.push(Insn::Cont(ContInsn::SetLabel(label)));
                }
                out.push(Insn::Cont(ContInsn::Suspend(point.kind)));
                if let Some(resume) = resume {
                    out.push(Insn::Label(resume));
                    out.push(Insn::Cont(ContInsn::ClearLabel));
                    restore_frame(out, point, written);
                }
            }
            SuspendKind::Call => {
                out.push(Insn::Var(Opcode::Astore, temp));
                if call.has_receiver {
                    out.push(Insn::Simple(Opcode::Pop));
                }
                save_operands(out, &point.stack);
                if let Some(label) = point.label {
                    out.push(Insn::Cont(ContInsn::SetLabel(label)));
                }
                out.push(Insn::Var(Opcode::Aload, temp));
                out.push(Insn::Cont(ContInsn::Suspend(SuspendKind::Call)));
                if let Some(resume) = resume {
                    out.push(Insn::Label(resume));
                    out.push(Insn::Cont(ContInsn::ClearLabel));
                    restore_frame(out, point, written);
                    out.push(Insn::Cont(ContInsn::CallAnswer));
                    let ret = self.config.call_method_return_type();
                    if ret != OBJECT_CLASS {
                        out.push(Insn::Type(Opcode::Checkcast, ret.to_string()));
                    }
                }
            }
            SuspendKind::Answer => {
                if !call.takes_value {
                    out.push(Insn::Simple(Opcode::AconstNull));
                }
                if call.has_receiver {
                    out.push(Insn::Simple(Opcode::Swap));
                    out.push(Insn::Simple(Opcode::Pop));
                }
                out.push(Insn::Cont(ContInsn::Suspend(SuspendKind::Answer)));
            }
        }
    }
}

/// Save operands top first so they come back bottom first
fn save_operands(out: &mut Vec<Insn>, stack: &[SlotType]) {
    for ty in stack.iter().rev() {
        out.push(Insn::Cont(ContInsn::SaveStack(ty.stack_kind())));
    }
}

fn restore_frame(out: &mut Vec<Insn>, point: &SuspendPoint, written: &FxHashSet<u16>) {
    for (index, ty) in &point.locals {
        if !written.contains(index) {
            continue;
        }
        if *ty == SlotType::Null {
            out.push(Insn::Simple(Opcode::AconstNull));
        } else {
            out.push(Insn::Cont(ContInsn::RestoreLocal(ty.stack_kind(), *index)));
        }
        out.push(Insn::Var(ty.stack_kind().store_opcode(), *index));
    }
    for ty in &point.stack {
        out.push(Insn::Cont(ContInsn::RestoreStack(ty.stack_kind())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::BasicInstrumentConfig;
    use rewind_bytecode::{verify_class, ClassBuilder, MethodRef};

    const SUPPORT: &str = "rt/ContinuableObject";

    fn counter_class() -> ClassFile {
        let mut class = ClassBuilder::new("app/Counter");
        class.super_class(SUPPORT).implements("rt/Continuable");
        let mut m = class.method("execute", "()V");
        let head = m.new_label();
        let exit = m.new_label();
        m.max_locals(2)
            .iconst(5)
            .istore(1)
            .place(head)
            .iload(1)
            .jump(Opcode::Ifle, exit)
            .aload(0)
            .invoke_virtual(SUPPORT, "pause", "()V")
            .iinc(1, -1)
            .goto(head)
            .place(exit)
            .op(Opcode::Return);
        class.add_method(m).unwrap();
        class.build()
    }

    fn conts(body: &CodeBody) -> Vec<ContInsn> {
        body.insns
            .iter()
            .filter_map(|i| match i {
                Insn::Cont(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_classify() {
        let config = BasicInstrumentConfig::default();
        let adapter = ResumableAdapter::new(&config);
        let invoke = |owner: &str, name: &str, desc: &str| {
            Insn::Invoke(Opcode::InvokeVirtual, MethodRef::new(owner, name, desc))
        };
        assert_eq!(
            adapter.classify("app/A", &invoke(SUPPORT, "pause", "()V")),
            Some(SuspendKind::Pause)
        );
        assert_eq!(
            adapter.classify("app/A", &invoke("app/A", "stepBack", "()V")),
            Some(SuspendKind::StepBack)
        );
        assert_eq!(
            adapter.classify("app/A", &invoke(SUPPORT, "call", "(Lrt/Object;)Lrt/Object;")),
            Some(SuspendKind::Call)
        );
        assert_eq!(
            adapter.classify("app/A", &invoke(SUPPORT, "answer", "(Lrt/Object;)V")),
            Some(SuspendKind::Answer)
        );
        assert_eq!(adapter.classify("app/A", &invoke(SUPPORT, "pause", "(I)V")), None);
        assert_eq!(adapter.classify("app/A", &invoke("app/Other", "pause", "()V")), None);
    }

    #[test]
    fn test_disabled_flavor_is_not_classified() {
        let config = BasicInstrumentConfig {
            pause: None,
            ..Default::default()
        };
        let adapter = ResumableAdapter::new(&config);
        let insn = Insn::Invoke(Opcode::InvokeVirtual, MethodRef::new(SUPPORT, "pause", "()V"));
        assert_eq!(adapter.classify("app/A", &insn), None);
    }

    #[test]
    fn test_rewrite_pause_loop() {
        let config = BasicInstrumentConfig::default();
        let adapter = ResumableAdapter::new(&config);
        let mut class = counter_class();
        assert!(adapter.adapt_class(&mut class).unwrap());
        assert!(class.flags & class_flags::INSTRUMENTED != 0);
        verify_class(&class).unwrap();

        let method = class.find_method("execute", "()V").unwrap();
        let body = method.body(&class.constants).unwrap();
        assert_eq!(body.insns[0], Insn::Cont(ContInsn::Enter));
        assert_eq!(body.insns[1], Insn::Cont(ContInsn::ReadLabel));
        assert!(matches!(&body.insns[2], Insn::TableSwitch { targets, .. } if targets.len() == 1));

        let ops = conts(&body);
        assert!(ops.contains(&ContInsn::MirrorLocal(StackKind::Int, 1)));
        assert!(ops.contains(&ContInsn::MirrorIinc(1, -1)));
        assert!(ops.contains(&ContInsn::SetLabel(0)));
        assert!(ops.contains(&ContInsn::Suspend(SuspendKind::Pause)));
        assert!(ops.contains(&ContInsn::RestoreLocal(StackKind::Int, 1)));
        assert_eq!(ops.last(), Some(&ContInsn::Exit));
        assert!(!body
            .insns
            .iter()
            .any(|i| matches!(i, Insn::Invoke(_, m) if m.name == "pause")));
    }

    #[test]
    fn test_rewrite_call_reserves_target_local() {
        let config = BasicInstrumentConfig::default();
        let adapter = ResumableAdapter::new(&config);
        let mut class = ClassBuilder::new("app/Caller");
        class.super_class(SUPPORT).implements("rt/Continuable");
        let mut m = class.method("execute", "()V");
        m.max_locals(2)
            .iconst(7)
            .aload(0)
            .ldc("app/Callee")
            .invoke_virtual(SUPPORT, "call", "(Lrt/Object;)Lrt/Object;")
            .astore(1)
            .op(Opcode::Pop)
            .op(Opcode::Return);
        class.add_method(m).unwrap();
        let mut class = class.build();

        adapter.adapt_class(&mut class).unwrap();
        verify_class(&class).unwrap();
        let method = class.find_method("execute", "()V").unwrap();
        assert_eq!(method.max_locals, 3);

        let ops = conts(&method.body(&class.constants).unwrap());
        let save = ops.iter().position(|c| *c == ContInsn::SaveStack(StackKind::Int));
        let suspend = ops
            .iter()
            .position(|c| *c == ContInsn::Suspend(SuspendKind::Call));
        let restore = ops
            .iter()
            .position(|c| *c == ContInsn::RestoreStack(StackKind::Int));
        let answer = ops.iter().position(|c| *c == ContInsn::CallAnswer);
        assert!(save < suspend && suspend < restore && restore < answer);
    }

    #[test]
    fn test_no_entry_method() {
        let config = BasicInstrumentConfig::default();
        let adapter = ResumableAdapter::new(&config);
        let mut class = ClassBuilder::new("app/Empty");
        class.implements("rt/Continuable");
        let mut class = class.build();
        assert!(!adapter.adapt_class(&mut class).unwrap());
        assert_eq!(class.flags & class_flags::INSTRUMENTED, 0);
    }
}
