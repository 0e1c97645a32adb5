//! Execution result types
//!
//! A method either returns, throws, or suspends. Suspension is an ordinary
//! result that unwinds every frame back to the runner.

use crate::context::ContinuationContext;
use crate::value::{ObjectRef, Value};
use rewind_bytecode::SuspendKind;
use std::sync::Arc;

/// A suspension raised by instrumented code
#[derive(Debug, Clone)]
pub struct Suspension {
    /// Which suspension method was reached
    pub kind: SuspendKind,
    /// Context of the suspending continuable
    pub context: Arc<ContinuationContext>,
    /// Call target or answer value
    pub value: Option<Value>,
}

/// Outcome of running a method to its end
#[derive(Debug, Clone)]
pub enum Completion {
    /// Normal return, with the value for non-void methods
    Return(Option<Value>),
    /// Execution suspended
    Suspend(Suspension),
    /// An exception escaped the method
    Throw(ObjectRef),
}

impl Completion {
    /// Check if the method returned normally
    pub fn is_return(&self) -> bool {
        matches!(self, Completion::Return(_))
    }

    /// Check if the method suspended
    pub fn is_suspend(&self) -> bool {
        matches!(self, Completion::Suspend(_))
    }
}

/// Result of executing a single instruction
#[derive(Debug)]
pub(crate) enum OpcodeResult {
    /// Continue with the next instruction
    Continue,
    /// Continue at an instruction index
    Jump(usize),
    /// Return from the current method
    Return(Option<Value>),
    /// Raise an exception in the current method
    Throw(ObjectRef),
    /// Unwind to the runner
    Suspend(Suspension),
}
