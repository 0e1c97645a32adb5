//! Control- and data-flow type inference
//!
//! Computes, for every suspension call in a method, which locals and operands
//! are live and with which types, so the rewrite can save them before
//! suspending and restore them after resuming.

mod analyzer;
mod context;
mod lattice;
mod node;
mod opcode;

pub use analyzer::{analyze_method, MethodTypes, SuspendPoint};
pub use context::TypesContext;
pub use lattice::{SlotType, OBJECT_CLASS, STRING_CLASS, THROWABLE_CLASS};
pub use node::{ExceptionEdge, FlowGraph, NodeId, NodeSort, TypesNode};
pub use opcode::{array_of, lower, LowerError, TypesOpcode};
