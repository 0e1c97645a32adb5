//! Flow graph over a method's instruction list
//!
//! Nodes are basic blocks split at labels, after branches and terminators,
//! and after suspension invocations (so each resume point starts a node).

use rewind_bytecode::{CodeBody, Insn, Label, SuspendKind};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};

/// Node identifier, an index into [`FlowGraph::nodes`]
pub type NodeId = usize;

/// How control enters a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeSort {
    /// Fallthrough or branch
    Regular,
    /// Exception handler entry
    Exception,
}

/// Exception edge out of a node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionEdge {
    /// Handler node
    pub handler: NodeId,
    /// Caught class, `None` catches everything
    pub catch_type: Option<String>,
}

/// One basic block
#[derive(Debug, Clone, Serialize)]
pub struct TypesNode {
    /// First instruction index
    pub start: usize,
    /// One past the last instruction index
    pub end: usize,
    /// Normal successors
    pub successors: Vec<NodeId>,
    /// Handlers covering any instruction of this node
    pub exception_successors: Vec<ExceptionEdge>,
    /// Nodes with an edge (normal or exception) into this one
    pub predecessors: Vec<NodeId>,
    /// How control enters this node
    pub sort: NodeSort,
    /// Handler nesting depth along the shortest path from the entry
    pub level: u32,
}

/// Flow graph of one method body
#[derive(Debug, Clone, Serialize)]
pub struct FlowGraph {
    /// All nodes; node 0 is the entry
    pub nodes: Vec<TypesNode>,
    #[serde(skip)]
    node_starting_at: FxHashMap<usize, NodeId>,
}

impl FlowGraph {
    /// Build the graph; `suspends` classifies suspension invocations
    pub fn build(body: &CodeBody, suspends: &dyn Fn(&Insn) -> Option<SuspendKind>) -> Result<Self, String> {
        let insns = &body.insns;
        let positions = body.label_positions();
        let label_index = |label: &Label| {
            positions
                .get(label)
                .copied()
                .ok_or_else(|| format!("unknown label {}", label))
        };

        let mut leaders = BTreeSet::new();
        leaders.insert(0);
        for (i, insn) in insns.iter().enumerate() {
            match insn {
                Insn::Label(_) => {
                    leaders.insert(i);
                }
                _ if insn.is_terminator() || !insn.branch_targets().is_empty() => {
                    leaders.insert(i + 1);
                }
                Insn::Invoke(..) if suspends(insn).is_some() => {
                    leaders.insert(i + 1);
                }
                _ => {}
            }
        }
        let mut handler_starts = FxHashSet::default();
        for handler in &body.handlers {
            handler_starts.insert(label_index(&handler.handler)?);
        }
        leaders.retain(|&i| i < insns.len());

        let starts: Vec<usize> = leaders.into_iter().collect();
        let node_starting_at: FxHashMap<usize, NodeId> =
            starts.iter().enumerate().map(|(id, &s)| (s, id)).collect();

        let mut nodes: Vec<TypesNode> = starts
            .iter()
            .enumerate()
            .map(|(id, &start)| TypesNode {
                start,
                end: starts.get(id + 1).copied().unwrap_or(insns.len()),
                successors: Vec::new(),
                exception_successors: Vec::new(),
                predecessors: Vec::new(),
                sort: if handler_starts.contains(&start) {
                    NodeSort::Exception
                } else {
                    NodeSort::Regular
                },
                level: 0,
            })
            .collect();

        let node_of = |index: usize| -> Result<NodeId, String> {
            node_starting_at
                .get(&index)
                .copied()
                .ok_or_else(|| format!("instruction {} does not start a node", index))
        };

        for id in 0..nodes.len() {
            let (start, end) = (nodes[id].start, nodes[id].end);
            let last = insns[start..end].iter().rev().find(|i| !matches!(i, Insn::Label(_)));
            let mut successors = Vec::new();
            if let Some(insn) = last {
                for target in insn.branch_targets() {
                    successors.push(node_of(label_index(&target)?)?);
                }
            }
            let falls_through = last.map(|i| !i.is_terminator()).unwrap_or(true);
            if falls_through && end < insns.len() {
                successors.push(node_of(end)?);
            }
            successors.dedup();
            nodes[id].successors = successors;

            for handler in &body.handlers {
                let covered = label_index(&handler.start)?..label_index(&handler.end)?;
                if covered.start < end && start < covered.end {
                    nodes[id].exception_successors.push(ExceptionEdge {
                        handler: node_of(label_index(&handler.handler)?)?,
                        catch_type: handler.catch_type.clone(),
                    });
                }
            }
        }

        for id in 0..nodes.len() {
            let targets: Vec<NodeId> = nodes[id]
                .successors
                .iter()
                .copied()
                .chain(nodes[id].exception_successors.iter().map(|e| e.handler))
                .collect();
            for target in targets {
                if !nodes[target].predecessors.contains(&id) {
                    nodes[target].predecessors.push(id);
                }
            }
        }

        let mut graph = Self {
            nodes,
            node_starting_at,
        };
        graph.assign_levels();
        Ok(graph)
    }

    /// Breadth-first level assignment: exception edges add one
    fn assign_levels(&mut self) {
        if self.nodes.is_empty() {
            return;
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([(0, 0u32)]);
        seen[0] = true;
        while let Some((id, level)) = queue.pop_front() {
            self.nodes[id].level = level;
            let normal = self.nodes[id].successors.iter().map(|&s| (s, level));
            let exceptional = self.nodes[id]
                .exception_successors
                .iter()
                .map(|e| (e.handler, level + 1));
            let next: Vec<(NodeId, u32)> = normal.chain(exceptional).collect();
            for (succ, succ_level) in next {
                if !seen[succ] {
                    seen[succ] = true;
                    queue.push_back((succ, succ_level));
                }
            }
        }
    }

    /// Node whose first instruction is `index`
    pub fn node_at(&self, index: usize) -> Option<NodeId> {
        self.node_starting_at.get(&index).copied()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes (empty body)
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_bytecode::{ClassBuilder, Opcode};

    fn no_suspends(_: &Insn) -> Option<SuspendKind> {
        None
    }

    #[test]
    fn test_loop_graph() {
        let class = ClassBuilder::new("app/L");
        let mut m = class.method("run", "()V");
        let head = m.new_label();
        let exit = m.new_label();
        m.max_locals(2)
            .iconst(3)
            .istore(1)
            .place(head)
            .iload(1)
            .jump(Opcode::Ifle, exit)
            .iinc(1, -1)
            .goto(head)
            .place(exit)
            .op(Opcode::Return);

        let graph = FlowGraph::build(m.body(), &no_suspends).unwrap();
        assert_eq!(graph.len(), 4);
        // entry -> head
        assert_eq!(graph.nodes[0].successors, vec![1]);
        // head branches to exit or falls into the body
        assert_eq!(graph.nodes[1].successors, vec![3, 2]);
        assert_eq!(graph.nodes[2].successors, vec![1]);
        assert!(graph.nodes[3].successors.is_empty());
        assert_eq!(graph.nodes[1].predecessors, vec![0, 2]);
    }

    #[test]
    fn test_handler_edges_and_levels() {
        let class = ClassBuilder::new("app/H");
        let mut m = class.method("run", "()V");
        let start = m.new_label();
        let end = m.new_label();
        let handler = m.new_label();
        m.place(start)
            .iconst(1)
            .op(Opcode::Pop)
            .place(end)
            .op(Opcode::Return)
            .place(handler)
            .op(Opcode::Pop)
            .op(Opcode::Return)
            .handler(start, end, handler, Some("rt/Throwable"));

        let graph = FlowGraph::build(m.body(), &no_suspends).unwrap();
        let handler_node = graph.node_at(5).unwrap();
        assert_eq!(graph.nodes[handler_node].sort, NodeSort::Exception);
        assert_eq!(graph.nodes[handler_node].level, 1);
        assert_eq!(graph.nodes[0].exception_successors[0].handler, handler_node);
    }
}
