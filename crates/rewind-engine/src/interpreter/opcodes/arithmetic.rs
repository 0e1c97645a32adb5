//! Arithmetic, conversion and comparison handlers

use crate::builtins::ARITHMETIC_EXCEPTION;
use crate::error::{ContinuationError, EngineResult};
use crate::interpreter::execution::OpcodeResult;
use crate::interpreter::frame::Frame;
use crate::interpreter::Interpreter;
use crate::value::Value;
use rewind_bytecode::Opcode;
use std::cmp::Ordering;

fn int_op(frame: &mut Frame, f: impl FnOnce(i32, i32) -> i32) -> EngineResult<OpcodeResult> {
    let b = frame.pop_int()?;
    let a = frame.pop_int()?;
    frame.push(Value::Int(f(a, b)));
    Ok(OpcodeResult::Continue)
}

fn long_op(frame: &mut Frame, f: impl FnOnce(i64, i64) -> i64) -> EngineResult<OpcodeResult> {
    let b = frame.pop_long()?;
    let a = frame.pop_long()?;
    frame.push(Value::Long(f(a, b)));
    Ok(OpcodeResult::Continue)
}

fn float_op(frame: &mut Frame, f: impl FnOnce(f32, f32) -> f32) -> EngineResult<OpcodeResult> {
    let b = frame.pop_float()?;
    let a = frame.pop_float()?;
    frame.push(Value::Float(f(a, b)));
    Ok(OpcodeResult::Continue)
}

fn double_op(frame: &mut Frame, f: impl FnOnce(f64, f64) -> f64) -> EngineResult<OpcodeResult> {
    let b = frame.pop_double()?;
    let a = frame.pop_double()?;
    frame.push(Value::Double(f(a, b)));
    Ok(OpcodeResult::Continue)
}

/// NaN compares as less
fn compare<T: PartialOrd>(a: T, b: T) -> i32 {
    match a.partial_cmp(&b) {
        Some(Ordering::Greater) => 1,
        Some(Ordering::Equal) => 0,
        _ => -1,
    }
}

impl<'a> Interpreter<'a> {
    pub(in crate::interpreter) fn exec_arithmetic_ops(
        &mut self,
        frame: &mut Frame,
        opcode: Opcode,
    ) -> EngineResult<OpcodeResult> {
        match opcode {
            // =========================================================
            // Integer
            // =========================================================
            Opcode::Iadd => int_op(frame, i32::wrapping_add),
            Opcode::Isub => int_op(frame, i32::wrapping_sub),
            Opcode::Imul => int_op(frame, i32::wrapping_mul),
            Opcode::Idiv | Opcode::Irem => {
                let b = frame.pop_int()?;
                let a = frame.pop_int()?;
                if b == 0 {
                    return self.throw_new(ARITHMETIC_EXCEPTION, "/ by zero");
                }
                let result = if opcode == Opcode::Idiv {
                    a.wrapping_div(b)
                } else {
                    a.wrapping_rem(b)
                };
                frame.push(Value::Int(result));
                Ok(OpcodeResult::Continue)
            }
            Opcode::Ineg => {
                let a = frame.pop_int()?;
                frame.push(Value::Int(a.wrapping_neg()));
                Ok(OpcodeResult::Continue)
            }
            Opcode::Iand => int_op(frame, |a, b| a & b),
            Opcode::Ior => int_op(frame, |a, b| a | b),
            Opcode::Ixor => int_op(frame, |a, b| a ^ b),
            Opcode::Ishl => int_op(frame, |a, b| a.wrapping_shl(b as u32 & 31)),
            Opcode::Ishr => int_op(frame, |a, b| a.wrapping_shr(b as u32 & 31)),

            // =========================================================
            // Long
            // =========================================================
            Opcode::Ladd => long_op(frame, i64::wrapping_add),
            Opcode::Lsub => long_op(frame, i64::wrapping_sub),
            Opcode::Lmul => long_op(frame, i64::wrapping_mul),
            Opcode::Ldiv => {
                let b = frame.pop_long()?;
                let a = frame.pop_long()?;
                if b == 0 {
                    return self.throw_new(ARITHMETIC_EXCEPTION, "/ by zero");
                }
                frame.push(Value::Long(a.wrapping_div(b)));
                Ok(OpcodeResult::Continue)
            }
            Opcode::Lneg => {
                let a = frame.pop_long()?;
                frame.push(Value::Long(a.wrapping_neg()));
                Ok(OpcodeResult::Continue)
            }

            // =========================================================
            // Float and double
            // =========================================================
            Opcode::Fadd => float_op(frame, |a, b| a + b),
            Opcode::Fsub => float_op(frame, |a, b| a - b),
            Opcode::Fmul => float_op(frame, |a, b| a * b),
            Opcode::Fdiv => float_op(frame, |a, b| a / b),
            Opcode::Fneg => {
                let a = frame.pop_float()?;
                frame.push(Value::Float(-a));
                Ok(OpcodeResult::Continue)
            }
            Opcode::Dadd => double_op(frame, |a, b| a + b),
            Opcode::Dsub => double_op(frame, |a, b| a - b),
            Opcode::Dmul => double_op(frame, |a, b| a * b),
            Opcode::Ddiv => double_op(frame, |a, b| a / b),
            Opcode::Dneg => {
                let a = frame.pop_double()?;
                frame.push(Value::Double(-a));
                Ok(OpcodeResult::Continue)
            }

            // =========================================================
            // Conversions
            // =========================================================
            Opcode::I2l | Opcode::I2f | Opcode::I2d | Opcode::I2b | Opcode::I2c | Opcode::I2s => {
                let a = frame.pop_int()?;
                frame.push(match opcode {
                    Opcode::I2l => Value::Long(a as i64),
                    Opcode::I2f => Value::Float(a as f32),
                    Opcode::I2d => Value::Double(a as f64),
                    Opcode::I2b => Value::Int(a as i8 as i32),
                    Opcode::I2c => Value::Int(a as u16 as i32),
                    _ => Value::Int(a as i16 as i32),
                });
                Ok(OpcodeResult::Continue)
            }
            Opcode::L2i | Opcode::L2f | Opcode::L2d => {
                let a = frame.pop_long()?;
                frame.push(match opcode {
                    Opcode::L2i => Value::Int(a as i32),
                    Opcode::L2f => Value::Float(a as f32),
                    _ => Value::Double(a as f64),
                });
                Ok(OpcodeResult::Continue)
            }
            Opcode::F2i | Opcode::F2l | Opcode::F2d => {
                let a = frame.pop_float()?;
                frame.push(match opcode {
                    Opcode::F2i => Value::Int(a as i32),
                    Opcode::F2l => Value::Long(a as i64),
                    _ => Value::Double(a as f64),
                });
                Ok(OpcodeResult::Continue)
            }
            Opcode::D2i | Opcode::D2l | Opcode::D2f => {
                let a = frame.pop_double()?;
                frame.push(match opcode {
                    Opcode::D2i => Value::Int(a as i32),
                    Opcode::D2l => Value::Long(a as i64),
                    _ => Value::Float(a as f32),
                });
                Ok(OpcodeResult::Continue)
            }

            // =========================================================
            // Comparisons
            // =========================================================
            Opcode::Lcmp => {
                let b = frame.pop_long()?;
                let a = frame.pop_long()?;
                frame.push(Value::Int(compare(a, b)));
                Ok(OpcodeResult::Continue)
            }
            Opcode::Fcmpl => {
                let b = frame.pop_float()?;
                let a = frame.pop_float()?;
                frame.push(Value::Int(compare(a, b)));
                Ok(OpcodeResult::Continue)
            }
            Opcode::Dcmpl => {
                let b = frame.pop_double()?;
                let a = frame.pop_double()?;
                frame.push(Value::Int(compare(a, b)));
                Ok(OpcodeResult::Continue)
            }

            other => Err(ContinuationError::Execution(format!(
                "opcode {:?} is not an arithmetic instruction",
                other
            ))),
        }
    }
}
