//! Activation frame

use crate::context::ContinuationContext;
use crate::error::{ContinuationError, EngineResult};
use crate::value::{ObjectRef, Value};
use std::sync::Arc;

/// Locals, operands and program counter of one method activation
pub(crate) struct Frame {
    pub locals: Vec<Value>,
    pub stack: Vec<Value>,
    pub pc: usize,
    /// Set by `ContEnter` in instrumented methods
    pub context: Option<Arc<ContinuationContext>>,
}

impl Frame {
    pub fn new(max_locals: u16, args: Vec<Value>) -> EngineResult<Self> {
        let max_locals = max_locals as usize;
        if args.len() > max_locals {
            return Err(ContinuationError::Execution(format!(
                "{} arguments do not fit in {} locals",
                args.len(),
                max_locals
            )));
        }
        let mut locals = args;
        locals.resize(max_locals, Value::NULL);
        Ok(Self {
            locals,
            stack: Vec::with_capacity(8),
            pc: 0,
            context: None,
        })
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> EngineResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| ContinuationError::Execution("operand stack underflow".to_string()))
    }

    pub fn peek(&self) -> EngineResult<&Value> {
        self.stack
            .last()
            .ok_or_else(|| ContinuationError::Execution("operand stack underflow".to_string()))
    }

    pub fn pop_int(&mut self) -> EngineResult<i32> {
        self.pop()?.as_int()
    }

    pub fn pop_long(&mut self) -> EngineResult<i64> {
        self.pop()?.as_long()
    }

    pub fn pop_float(&mut self) -> EngineResult<f32> {
        self.pop()?.as_float()
    }

    pub fn pop_double(&mut self) -> EngineResult<f64> {
        self.pop()?.as_double()
    }

    pub fn pop_ref(&mut self) -> EngineResult<Option<ObjectRef>> {
        self.pop()?.as_object()
    }

    /// Pop `count` values, returned bottom first
    pub fn pop_n(&mut self, count: usize) -> EngineResult<Vec<Value>> {
        if self.stack.len() < count {
            return Err(ContinuationError::Execution("operand stack underflow".to_string()));
        }
        let at = self.stack.len() - count;
        Ok(self.stack.split_off(at))
    }

    pub fn load(&self, index: u16) -> EngineResult<Value> {
        self.locals
            .get(index as usize)
            .cloned()
            .ok_or_else(|| ContinuationError::Execution(format!("local {} out of range", index)))
    }

    pub fn store(&mut self, index: u16, value: Value) -> EngineResult<()> {
        let slot = self
            .locals
            .get_mut(index as usize)
            .ok_or_else(|| ContinuationError::Execution(format!("local {} out of range", index)))?;
        *slot = value;
        Ok(())
    }

    pub fn context(&self) -> EngineResult<Arc<ContinuationContext>> {
        self.context.clone().ok_or(ContinuationError::NoActiveContext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_locals_and_stack() {
        let mut frame = Frame::new(3, vec![Value::Int(1)]).unwrap();
        assert_eq!(frame.locals.len(), 3);
        assert!(frame.load(2).unwrap().is_null());
        frame.store(2, Value::Long(9)).unwrap();
        assert!(frame.store(3, Value::Int(0)).is_err());

        frame.push(Value::Int(1));
        frame.push(Value::Int(2));
        frame.push(Value::Int(3));
        let args = frame.pop_n(2).unwrap();
        assert_eq!(args[0].as_int().unwrap(), 2);
        assert_eq!(frame.pop_int().unwrap(), 1);
        assert!(frame.pop().is_err());
    }

    #[test]
    fn test_too_many_arguments() {
        assert!(Frame::new(1, vec![Value::Int(1), Value::Int(2)]).is_err());
    }

    #[test]
    fn test_no_context() {
        let frame = Frame::new(1, Vec::new()).unwrap();
        assert!(matches!(frame.context(), Err(ContinuationError::NoActiveContext)));
    }
}
