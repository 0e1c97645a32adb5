//! Work-list type inference over a [`FlowGraph`]
//!
//! Starting from the entry frame, each node's entry frame is pushed through
//! its instructions; the result is merged into every successor and a node is
//! re-queued whenever its entry frame changes. Loops converge because the
//! lattice is finite; a node processed more than [`MAX_NODE_VISITS`] times
//! aborts the analysis.

use super::context::TypesContext;
use super::lattice::{SlotType, THROWABLE_CLASS};
use super::node::{FlowGraph, NodeId};
use super::opcode::{lower, LowerError, TypesOpcode};
use crate::defaults::MAX_NODE_VISITS;
use crate::error::{ContinuationError, EngineResult};
use rewind_bytecode::{CodeBody, Insn, MethodDescriptor, MethodDef, Opcode, SuspendKind};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::VecDeque;

/// Everything the rewrite needs to know about one suspension call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspendPoint {
    /// Index of the invocation in the instruction list
    pub index: usize,
    /// Suspension flavor
    pub kind: SuspendKind,
    /// Resume label for pause and call points
    pub label: Option<i32>,
    /// Written locals at the call, lowest index first
    pub locals: Vec<(u16, SlotType)>,
    /// Operands beneath the receiver and arguments, bottom first
    pub stack: Vec<SlotType>,
    /// Declared return type of the call
    pub returns: Option<SlotType>,
}

/// Result of analyzing one method
#[derive(Debug, Clone, Serialize)]
pub struct MethodTypes {
    /// `owner.name descriptor`
    pub method: String,
    /// The flow graph
    pub graph: FlowGraph,
    /// Entry frame of every node, `None` if unreachable
    pub frames: Vec<Option<TypesContext>>,
    /// Suspension points in instruction order
    pub points: Vec<SuspendPoint>,
}

impl MethodTypes {
    /// Suspension point at instruction `index`
    pub fn point_at(&self, index: usize) -> Option<&SuspendPoint> {
        self.points.iter().find(|p| p.index == index)
    }

    /// Number of resume labels
    pub fn label_count(&self) -> usize {
        self.points.iter().filter(|p| p.label.is_some()).count()
    }
}

fn merge_into(frames: &mut [Option<TypesContext>], target: NodeId, incoming: &TypesContext) -> Result<bool, String> {
    match &frames[target] {
        None => {
            frames[target] = Some(incoming.clone());
            Ok(true)
        }
        Some(existing) => {
            let merged = existing.merge(incoming)?;
            if &merged == existing {
                Ok(false)
            } else {
                frames[target] = Some(merged);
                Ok(true)
            }
        }
    }
}

/// Infer frame types for `method` of class `owner`
///
/// `classify` tells which invocations are suspension calls.
pub fn analyze_method(
    owner: &str,
    method: &MethodDef,
    body: &CodeBody,
    classify: &dyn Fn(&Insn) -> Option<SuspendKind>,
) -> EngineResult<MethodTypes> {
    let id = format!("{}.{}{}", owner, method.name, method.descriptor);
    let fail = |reason: String| ContinuationError::Analysis {
        method: id.clone(),
        reason,
    };

    let desc = MethodDescriptor::parse(&method.descriptor).map_err(|e| fail(e.to_string()))?;
    let graph = FlowGraph::build(body, classify).map_err(fail)?;

    let mut frames: Vec<Option<TypesContext>> = vec![None; graph.len()];
    let mut captured: FxHashMap<usize, (SuspendKind, TypesContext)> = FxHashMap::default();

    if !graph.is_empty() {
        frames[0] = Some(TypesContext::entry(owner, method.is_static(), &desc, method.max_locals));
    }

    let mut visits = vec![0usize; graph.len()];
    let mut queued = vec![false; graph.len()];
    let mut work = VecDeque::new();
    if !graph.is_empty() {
        work.push_back(0);
        queued[0] = true;
    }

    while let Some(node_id) = work.pop_front() {
        queued[node_id] = false;
        visits[node_id] += 1;
        if visits[node_id] > MAX_NODE_VISITS {
            return Err(fail(format!(
                "node {} did not converge after {} visits",
                node_id, MAX_NODE_VISITS
            )));
        }

        let node = &graph.nodes[node_id];
        let Some(mut frame) = frames[node_id].clone() else {
            continue;
        };
        tracing::trace!(method = %id, node = node_id, level = node.level, stack = frame.stack.len(), "types: visit");

        let mut changed = Vec::new();
        let mut propagate_exceptions = |frame: &TypesContext,
                                        frames: &mut Vec<Option<TypesContext>>|
         -> Result<(), String> {
            for edge in &node.exception_successors {
                let caught = SlotType::object(edge.catch_type.as_deref().unwrap_or(THROWABLE_CLASS));
                let handler_frame = TypesContext::exception(frame.locals.clone(), caught);
                if merge_into(frames, edge.handler, &handler_frame)? {
                    changed.push(edge.handler);
                }
            }
            Ok(())
        };
        propagate_exceptions(&frame, &mut frames).map_err(&fail)?;

        for index in node.start..node.end {
            let insn = &body.insns[index];
            let suspend = match insn {
                Insn::Invoke(..) => classify(insn),
                _ => None,
            };
            let ops = lower(insn, suspend).map_err(|e| match e {
                LowerError::AlreadyInstrumented => fail("method is already instrumented".into()),
                LowerError::Descriptor(reason) => fail(reason),
            })?;
            for op in &ops {
                if let TypesOpcode::Suspend(kind) = op {
                    captured.insert(index, (*kind, frame.clone()));
                }
                frame
                    .apply(op)
                    .map_err(|reason| fail(format!("at instruction {} ({}): {}", index, insn, reason)))?;
            }
            if matches!(insn, Insn::Var(..) | Insn::Iinc { .. }) {
                propagate_exceptions(&frame, &mut frames).map_err(&fail)?;
            }
        }

        for &succ in &node.successors {
            if merge_into(&mut frames, succ, &frame).map_err(&fail)? {
                changed.push(succ);
            }
        }
        for succ in changed {
            if !queued[succ] {
                queued[succ] = true;
                work.push_back(succ);
            }
        }
    }

    let mut indices: Vec<usize> = captured.keys().copied().collect();
    indices.sort_unstable();
    let mut next_label = 0;
    let mut points = Vec::with_capacity(indices.len());
    for index in indices {
        let Some((kind, frame)) = captured.remove(&index) else {
            continue;
        };
        let Insn::Invoke(op, target) = &body.insns[index] else {
            continue;
        };
        let call_desc = MethodDescriptor::parse(&target.descriptor).map_err(|e| fail(e.to_string()))?;
        let consumed = call_desc.arg_count() + usize::from(*op != Opcode::InvokeStatic);
        let keep = frame.stack.len().saturating_sub(consumed);
        let label = match kind {
            SuspendKind::Pause | SuspendKind::Call => {
                let label = next_label;
                next_label += 1;
                Some(label)
            }
            SuspendKind::StepBack | SuspendKind::Answer => None,
        };
        tracing::trace!(method = %id, index, kind = kind.name(), ?label, saved = keep, "types: suspension point");
        points.push(SuspendPoint {
            index,
            kind,
            label,
            locals: frame.live_locals(),
            stack: frame.stack[..keep].to_vec(),
            returns: call_desc.ret.as_ref().map(SlotType::from_field_type),
        });
    }

    Ok(MethodTypes {
        method: id.clone(),
        graph,
        frames,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_bytecode::{ClassBuilder, ClassFile};

    fn pause_classifier(insn: &Insn) -> Option<SuspendKind> {
        match insn {
            Insn::Invoke(_, m) if m.name == "pause" => Some(SuspendKind::Pause),
            Insn::Invoke(_, m) if m.name == "call" => Some(SuspendKind::Call),
            _ => None,
        }
    }

    fn analyze(class: &ClassFile) -> MethodTypes {
        let method = &class.methods[0];
        let body = method.body(&class.constants).unwrap();
        analyze_method(&class.name, method, &body, &pause_classifier).unwrap()
    }

    #[test]
    fn test_loop_with_pause() {
        let mut class = ClassBuilder::new("app/Counter");
        let mut m = class.method("execute", "()V");
        let head = m.new_label();
        let exit = m.new_label();
        m.max_locals(3)
            .iconst(5)
            .istore(1)
            .place(head)
            .iload(1)
            .jump(Opcode::Ifle, exit)
            .lconst(7)
            .aload(0)
            .invoke_virtual("app/Counter", "pause", "()V")
            .op(Opcode::Pop2)
            .iinc(1, -1)
            .goto(head)
            .place(exit)
            .op(Opcode::Return);
        class.add_method(m).unwrap();

        let types = analyze(&class.build());
        assert_eq!(types.points.len(), 1);
        let point = &types.points[0];
        assert_eq!(point.kind, SuspendKind::Pause);
        assert_eq!(point.label, Some(0));
        assert_eq!(
            point.locals,
            vec![(0, SlotType::object("app/Counter")), (1, SlotType::Int)]
        );
        assert_eq!(point.stack, vec![SlotType::Long]);
        assert_eq!(types.label_count(), 1);
    }

    #[test]
    fn test_join_widens_and_drops() {
        let mut class = ClassBuilder::new("app/Join");
        let mut m = class.method("execute", "(Z)V");
        let other = m.new_label();
        let join = m.new_label();
        m.max_locals(4)
            .iload(1)
            .jump(Opcode::Ifeq, other)
            .iconst(1)
            .op(Opcode::I2b)
            .istore(2)
            .lconst(1)
            .var(Opcode::Lstore, 3)
            .goto(join)
            .place(other)
            .iconst(2)
            .op(Opcode::I2c)
            .istore(2)
            .place(join)
            .aload(0)
            .invoke_virtual("app/Join", "pause", "()V")
            .op(Opcode::Return);
        class.add_method(m).unwrap();

        let types = analyze(&class.build());
        let point = &types.points[0];
        assert!(point.locals.contains(&(2, SlotType::Int)));
        assert!(!point.locals.iter().any(|(i, _)| *i == 3));
        assert!(point.locals.contains(&(1, SlotType::Boolean)));
    }

    #[test]
    fn test_call_point_keeps_operands_below_target() {
        let mut class = ClassBuilder::new("app/Caller");
        let mut m = class.method("execute", "()V");
        m.max_locals(1)
            .ldc("prefix")
            .aload(0)
            .ldc("app/Callee")
            .invoke_virtual("app/Caller", "call", "(Lrt/Object;)Lrt/Object;")
            .op(Opcode::Pop)
            .op(Opcode::Pop)
            .op(Opcode::Return);
        class.add_method(m).unwrap();

        let types = analyze(&class.build());
        let point = &types.points[0];
        assert_eq!(point.kind, SuspendKind::Call);
        assert_eq!(point.stack, vec![SlotType::object("rt/String")]);
        assert_eq!(point.returns, Some(SlotType::object("rt/Object")));
    }

    #[test]
    fn test_handler_frame_has_caught_type() {
        let mut class = ClassBuilder::new("app/Catch");
        let mut m = class.method("execute", "()V");
        let start = m.new_label();
        let end = m.new_label();
        let handler = m.new_label();
        m.max_locals(2)
            .place(start)
            .iconst(1)
            .istore(1)
            .place(end)
            .op(Opcode::Return)
            .place(handler)
            .astore(1)
            .op(Opcode::Return)
            .handler(start, end, handler, None);
        class.add_method(m).unwrap();

        let types = analyze(&class.build());
        let handler_node = types.graph.node_at(5).unwrap();
        let frame = types.frames[handler_node].as_ref().unwrap();
        assert_eq!(frame.stack, vec![SlotType::object(THROWABLE_CLASS)]);
        // Local 1 is unset on entry and an int after the store; the merge drops it.
        assert_eq!(frame.locals[1], None);
    }

    #[test]
    fn test_stack_height_mismatch_fails() {
        let mut class = ClassBuilder::new("app/Bad");
        let mut m = class.method("execute", "(I)V");
        let join = m.new_label();
        m.max_locals(2)
            .iload(1)
            .jump(Opcode::Ifeq, join)
            .iconst(3)
            .place(join)
            .op(Opcode::Return);
        class.add_method(m).unwrap();

        let class = class.build();
        let method = &class.methods[0];
        let body = method.body(&class.constants).unwrap();
        let err = analyze_method(&class.name, method, &body, &pause_classifier).unwrap_err();
        assert!(err.to_string().contains("stack height mismatch"));
    }
}
