//! Opcode handlers, grouped by instruction category
//!
//! Each submodule adds `exec_*` methods to [`Interpreter`](super::Interpreter).

mod arithmetic;
mod arrays;
mod continuation;
mod control_flow;
mod objects;
mod stack;
mod variables;
