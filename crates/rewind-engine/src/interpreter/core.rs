//! Interpreter core: invocation, the dispatch loop and exception handling

use super::execution::{Completion, OpcodeResult};
use super::frame::Frame;
use crate::builtins::NULL_POINTER_EXCEPTION;
use crate::defaults::MAX_CALL_DEPTH;
use crate::error::{ContinuationError, EngineResult};
use crate::loader::{ContinuableClassLoader, MethodCode, RuntimeMethod};
use crate::natives::{native_key, NativeRegistry};
use crate::scope::ExecutionScope;
use crate::value::{ObjectRef, Value};
use rewind_bytecode::{Insn, Opcode};
use std::sync::Arc;

/// Executes methods of loaded classes
///
/// One interpreter serves one run; suspension unwinds every frame and is
/// reported as [`Completion::Suspend`].
pub struct Interpreter<'a> {
    pub(in crate::interpreter) loader: &'a ContinuableClassLoader,
    pub(in crate::interpreter) natives: &'a NativeRegistry,
    pub(in crate::interpreter) scope: &'a mut ExecutionScope,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    /// Create an interpreter over a loader, natives and a scope
    pub fn new(
        loader: &'a ContinuableClassLoader,
        natives: &'a NativeRegistry,
        scope: &'a mut ExecutionScope,
    ) -> Self {
        Self {
            loader,
            natives,
            scope,
            depth: 0,
        }
    }

    /// Run the configured entry method of `continuable`
    pub fn run_entry(&mut self, continuable: &ObjectRef) -> EngineResult<Completion> {
        let config = self.loader.transformer().config();
        let name = config.entry_method_name().to_string();
        let descriptor = config.entry_method_descriptor().to_string();

        let class = self.loader.load(continuable.class_name())?;
        let method = class.find_method(&name, &descriptor).ok_or_else(|| {
            ContinuationError::NoSuchMethod(format!("{}.{}:{}", class.name, name, descriptor))
        })?;
        if method.is_static() || !method.signature.params.is_empty() {
            return Err(ContinuationError::Execution(format!(
                "entry method {} must be an instance method without arguments",
                method.qualified_name()
            )));
        }
        self.invoke(&method, vec![Value::object(continuable.clone())])
    }

    /// Invoke a method with its receiver (if any) and arguments
    pub fn invoke(&mut self, method: &Arc<RuntimeMethod>, args: Vec<Value>) -> EngineResult<Completion> {
        if method.is_native() {
            let key = native_key(&method.owner, &method.name, &method.descriptor);
            let handler = self
                .natives
                .get(&key)
                .ok_or(ContinuationError::NativeNotFound(key))?;
            return Ok(Completion::Return(handler(&args)?));
        }

        let code = method.code.as_ref().ok_or_else(|| {
            ContinuationError::Execution(format!("{} has no body", method.qualified_name()))
        })?;
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ContinuationError::Execution(format!(
                "call depth limit of {} exceeded in {}",
                MAX_CALL_DEPTH,
                method.qualified_name()
            )));
        }

        self.depth += 1;
        let result = self.execute(method, code, args);
        self.depth -= 1;
        result
    }

    fn execute(&mut self, method: &RuntimeMethod, code: &MethodCode, args: Vec<Value>) -> EngineResult<Completion> {
        let mut frame = Frame::new(method.max_locals, args)?;
        loop {
            let insn = code.insns.get(frame.pc).ok_or_else(|| {
                ContinuationError::Execution(format!("{} ran past its last instruction", method.qualified_name()))
            })?;

            match self.step(&mut frame, code, insn)? {
                OpcodeResult::Continue => frame.pc += 1,
                OpcodeResult::Jump(target) => frame.pc = target,
                OpcodeResult::Return(value) => return Ok(Completion::Return(value)),
                OpcodeResult::Suspend(suspension) => {
                    tracing::trace!(
                        method = %method.qualified_name(),
                        kind = suspension.kind.name(),
                        "interpreter: suspended"
                    );
                    return Ok(Completion::Suspend(suspension));
                }
                OpcodeResult::Throw(exception) => match self.find_handler(code, frame.pc, &exception)? {
                    Some(handler) => {
                        frame.stack.clear();
                        frame.push(Value::object(exception));
                        frame.pc = handler;
                    }
                    None => return Ok(Completion::Throw(exception)),
                },
            }
        }
    }

    fn step(&mut self, frame: &mut Frame, code: &MethodCode, insn: &Insn) -> EngineResult<OpcodeResult> {
        match insn {
            Insn::Label(_) => Ok(OpcodeResult::Continue),
            Insn::Simple(op) => self.exec_simple(frame, *op),
            Insn::IntConst(_, value) => self.exec_push(frame, Value::Int(*value)),
            Insn::LongConst(value) => self.exec_push(frame, Value::Long(*value)),
            Insn::FloatConst(value) => self.exec_push(frame, Value::Float(*value)),
            Insn::DoubleConst(value) => self.exec_push(frame, Value::Double(*value)),
            Insn::StringConst(value) => self.exec_push(frame, Value::string(value.as_str())),
            Insn::Var(op, index) => self.exec_variable_ops(frame, *op, *index),
            Insn::Iinc { index, delta } => self.exec_iinc(frame, *index, *delta),
            Insn::Jump(op, label) => self.exec_jump(frame, code, *op, *label),
            Insn::TableSwitch {
                low,
                default,
                targets,
            } => self.exec_table_switch(frame, code, *low, *default, targets),
            Insn::Type(op, name) => self.exec_type_ops(frame, *op, name),
            Insn::Field(op, field) => self.exec_field_ops(frame, *op, field),
            Insn::Invoke(op, target) => self.exec_invoke(frame, *op, target),
            Insn::NewArray(kind) => self.exec_new_array(frame, *kind),
            Insn::Cont(op) => self.exec_continuation_ops(frame, op),
        }
    }

    fn exec_simple(&mut self, frame: &mut Frame, op: Opcode) -> EngineResult<OpcodeResult> {
        match op {
            Opcode::Nop => Ok(OpcodeResult::Continue),
            Opcode::AconstNull => self.exec_push(frame, Value::NULL),
            Opcode::Pop
            | Opcode::Pop2
            | Opcode::Dup
            | Opcode::DupX1
            | Opcode::DupX2
            | Opcode::Dup2
            | Opcode::Swap => self.exec_stack_ops(frame, op),
            Opcode::ArrayLength
            | Opcode::Iaload
            | Opcode::Laload
            | Opcode::Faload
            | Opcode::Daload
            | Opcode::Aaload
            | Opcode::Iastore
            | Opcode::Lastore
            | Opcode::Fastore
            | Opcode::Dastore
            | Opcode::Aastore => self.exec_array_ops(frame, op),
            Opcode::Return
            | Opcode::Ireturn
            | Opcode::Lreturn
            | Opcode::Freturn
            | Opcode::Dreturn
            | Opcode::Areturn => self.exec_return(frame, op),
            Opcode::Athrow => match frame.pop_ref()? {
                Some(exception) => Ok(OpcodeResult::Throw(exception)),
                None => self.throw_new(NULL_POINTER_EXCEPTION, "throw of null"),
            },
            _ => self.exec_arithmetic_ops(frame, op),
        }
    }

    fn exec_push(&mut self, frame: &mut Frame, value: Value) -> EngineResult<OpcodeResult> {
        frame.push(value);
        Ok(OpcodeResult::Continue)
    }

    /// Instantiate a VM exception with a message and raise it
    pub(in crate::interpreter) fn throw_new(&mut self, class: &str, message: &str) -> EngineResult<OpcodeResult> {
        let exception = self.loader.instantiate_named(class)?;
        exception.set_field("message", Value::string(message));
        Ok(OpcodeResult::Throw(exception))
    }

    fn find_handler(&self, code: &MethodCode, pc: usize, exception: &ObjectRef) -> EngineResult<Option<usize>> {
        for handler in &code.handlers {
            if pc < handler.start || pc >= handler.end {
                continue;
            }
            let caught = match &handler.catch_type {
                None => true,
                Some(catch_type) => self.loader.is_assignable(exception.class_name(), catch_type)?,
            };
            if caught {
                return Ok(Some(handler.handler));
            }
        }
        Ok(None)
    }
}
