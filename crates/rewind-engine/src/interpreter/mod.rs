//! Bytecode interpreter
//!
//! Executes loaded classes, including the continuation instructions the
//! rewriter inserts into entry methods. A suspension unwinds every frame and
//! surfaces as [`Completion::Suspend`]; the captured state lives in the
//! continuation context, so resuming means running the entry method again.

mod core;
mod execution;
mod frame;
mod opcodes;

pub use self::core::Interpreter;
pub use execution::{Completion, Suspension};
