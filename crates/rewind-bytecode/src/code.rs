//! Conversion between code bytes and the symbolic instruction list
//!
//! Jump offsets are encoded as `i32` values relative to the first byte of the
//! jumping instruction. Exception handler ranges are byte offsets in the class
//! file and labels in a [`CodeBody`].

use crate::class::ExceptionHandler;
use crate::constants::{Constant, ConstantPool};
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::insn::{stack_kind_at, ArrayKind, ContInsn, Insn, Label, SuspendKind};
use crate::opcode::Opcode;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors converting method code
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodeError {
    /// Malformed bytes
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Constant pool index of the wrong kind or out of range
    #[error("Constant {index} is not a valid {expected} entry")]
    BadConstant {
        /// Pool index
        index: u32,
        /// Entry kind the instruction needs
        expected: &'static str,
    },

    /// A jump or handler points outside the code or into an instruction
    #[error("Invalid jump target {target} from offset {offset}")]
    InvalidJumpTarget {
        /// Offset of the instruction (or handler entry)
        offset: usize,
        /// Computed absolute target
        target: i64,
    },

    /// Table switch with `high < low`
    #[error("Invalid table switch at offset {0}")]
    InvalidSwitch(usize),

    /// A label is referenced but never placed
    #[error("Label {0} is not placed in the instruction list")]
    UnknownLabel(Label),

    /// A label is placed twice
    #[error("Label {0} is placed more than once")]
    DuplicateLabel(Label),
}

/// Exception handler expressed with labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerBlock {
    /// First covered instruction
    pub start: Label,
    /// End of the covered range (exclusive)
    pub end: Label,
    /// Handler entry point
    pub handler: Label,
    /// Caught class, `None` catches everything
    pub catch_type: Option<String>,
}

/// A decoded method body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeBody {
    /// Instructions with inline labels
    pub insns: Vec<Insn>,
    /// Exception handlers in priority order
    pub handlers: Vec<HandlerBlock>,
    next_label: u32,
}

impl CodeBody {
    /// Create an empty body
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a body from an instruction list, reserving labels above any
    /// already used in `insns`
    pub fn from_insns(insns: Vec<Insn>, handlers: Vec<HandlerBlock>) -> Self {
        let next_label = insns
            .iter()
            .filter_map(|i| match i {
                Insn::Label(l) => Some(l.0 + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        Self {
            insns,
            handlers,
            next_label,
        }
    }

    /// Allocate a fresh, not yet placed label
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Map each placed label to its index in `insns`
    pub fn label_positions(&self) -> FxHashMap<Label, usize> {
        self.insns
            .iter()
            .enumerate()
            .filter_map(|(i, insn)| match insn {
                Insn::Label(l) => Some((*l, i)),
                _ => None,
            })
            .collect()
    }
}

/// Decode code bytes into a symbolic body
pub fn decode_code(
    code: &[u8],
    handlers: &[ExceptionHandler],
    pool: &ConstantPool,
) -> Result<CodeBody, CodeError> {
    let mut reader = BytecodeReader::new(code);
    let mut raw: Vec<(usize, Insn)> = Vec::new();
    while !reader.is_at_end() {
        let offset = reader.position();
        let insn = decode_insn(&mut reader, offset, pool)?;
        raw.push((offset, insn));
    }

    let boundaries: FxHashSet<usize> = raw
        .iter()
        .map(|(offset, _)| *offset)
        .chain(std::iter::once(code.len()))
        .collect();

    let mut targets = BTreeSet::new();
    for (offset, insn) in &raw {
        for target in insn.branch_targets() {
            targets.insert((*offset, target.0 as usize));
        }
    }
    for handler in handlers {
        for pc in [handler.start_pc, handler.end_pc, handler.handler_pc] {
            targets.insert((handler.start_pc as usize, pc as usize));
        }
    }
    for (offset, target) in &targets {
        if !boundaries.contains(target) {
            return Err(CodeError::InvalidJumpTarget {
                offset: *offset,
                target: *target as i64,
            });
        }
    }

    let ordered: BTreeSet<usize> = targets.into_iter().map(|(_, t)| t).collect();
    let labels: FxHashMap<usize, Label> = ordered
        .iter()
        .enumerate()
        .map(|(i, offset)| (*offset, Label(i as u32)))
        .collect();
    let lookup = |offset: usize| -> Result<Label, CodeError> {
        labels.get(&offset).copied().ok_or(CodeError::InvalidJumpTarget {
            offset,
            target: offset as i64,
        })
    };

    let mut insns = Vec::with_capacity(raw.len() + labels.len());
    for (offset, insn) in raw {
        if let Some(label) = labels.get(&offset) {
            insns.push(Insn::Label(*label));
        }
        let insn = match insn {
            Insn::Jump(op, target) => Insn::Jump(op, lookup(target.0 as usize)?),
            Insn::TableSwitch {
                low,
                default,
                targets,
            } => Insn::TableSwitch {
                low,
                default: lookup(default.0 as usize)?,
                targets: targets
                    .into_iter()
                    .map(|t| lookup(t.0 as usize))
                    .collect::<Result<_, _>>()?,
            },
            other => other,
        };
        insns.push(insn);
    }
    if let Some(label) = labels.get(&code.len()) {
        insns.push(Insn::Label(*label));
    }

    let handlers = handlers
        .iter()
        .map(|h| {
            Ok(HandlerBlock {
                start: lookup(h.start_pc as usize)?,
                end: lookup(h.end_pc as usize)?,
                handler: lookup(h.handler_pc as usize)?,
                catch_type: h.catch_type.clone(),
            })
        })
        .collect::<Result<Vec<_>, CodeError>>()?;

    Ok(CodeBody {
        insns,
        handlers,
        next_label: labels.len() as u32,
    })
}

/// Lay out a symbolic body as code bytes, interning constants into `pool`
pub fn encode_code(
    body: &CodeBody,
    pool: &mut ConstantPool,
) -> Result<(Vec<u8>, Vec<ExceptionHandler>), CodeError> {
    let mut offsets: FxHashMap<Label, usize> = FxHashMap::default();
    let mut pc = 0usize;
    for insn in &body.insns {
        if let Insn::Label(label) = insn {
            if offsets.insert(*label, pc).is_some() {
                return Err(CodeError::DuplicateLabel(*label));
            }
        }
        pc += insn.encoded_len();
    }

    let mut writer = BytecodeWriter::with_capacity(pc);
    for insn in &body.insns {
        let start = writer.offset();
        let relative = |label: &Label| -> Result<i32, CodeError> {
            offsets
                .get(label)
                .map(|target| *target as i32 - start as i32)
                .ok_or(CodeError::UnknownLabel(*label))
        };

        if let Some(op) = insn.opcode() {
            writer.emit_u8(op.to_u8());
        }
        match insn {
            Insn::Label(_) | Insn::Simple(_) => {}
            Insn::IntConst(Opcode::Bipush, v) => writer.emit_i8(*v as i8),
            Insn::IntConst(Opcode::Sipush, v) => writer.emit_i16(*v as i16),
            Insn::IntConst(_, v) => writer.emit_i32(*v),
            Insn::LongConst(v) => writer.emit_i64(*v),
            Insn::FloatConst(v) => writer.emit_f32(*v),
            Insn::DoubleConst(v) => writer.emit_f64(*v),
            Insn::StringConst(s) => writer.emit_u32(pool.add_string(s)),
            Insn::Var(_, index) => writer.emit_u16(*index),
            Insn::Iinc { index, delta } => {
                writer.emit_u16(*index);
                writer.emit_i16(*delta);
            }
            Insn::Jump(_, label) => writer.emit_i32(relative(label)?),
            Insn::TableSwitch {
                low,
                default,
                targets,
            } => {
                writer.emit_i32(*low);
                writer.emit_i32(low + targets.len() as i32 - 1);
                writer.emit_i32(relative(default)?);
                for target in targets {
                    writer.emit_i32(relative(target)?);
                }
            }
            Insn::Type(_, class) => writer.emit_u32(pool.add_class(class)),
            Insn::Field(_, field) => writer.emit_u32(pool.add(Constant::Field(field.clone()))),
            Insn::Invoke(_, method) => writer.emit_u32(pool.add(Constant::Method(method.clone()))),
            Insn::NewArray(kind) => writer.emit_u8(*kind as u8),
            Insn::Cont(cont) => match cont {
                ContInsn::SetLabel(label) => writer.emit_i32(*label),
                ContInsn::MirrorLocal(kind, index) | ContInsn::RestoreLocal(kind, index) => {
                    writer.emit_u8(*kind as u8);
                    writer.emit_u16(*index);
                }
                ContInsn::MirrorIinc(index, delta) => {
                    writer.emit_u16(*index);
                    writer.emit_i16(*delta);
                }
                ContInsn::SaveStack(kind) | ContInsn::RestoreStack(kind) => {
                    writer.emit_u8(*kind as u8)
                }
                ContInsn::Suspend(kind) => writer.emit_u8(*kind as u8),
                ContInsn::Enter
                | ContInsn::Exit
                | ContInsn::ReadLabel
                | ContInsn::ClearLabel
                | ContInsn::CallAnswer => {}
            },
        }
    }

    let label_pc = |label: &Label| -> Result<u32, CodeError> {
        offsets
            .get(label)
            .map(|pc| *pc as u32)
            .ok_or(CodeError::UnknownLabel(*label))
    };
    let handlers = body
        .handlers
        .iter()
        .map(|h| {
            Ok(ExceptionHandler {
                start_pc: label_pc(&h.start)?,
                end_pc: label_pc(&h.end)?,
                handler_pc: label_pc(&h.handler)?,
                catch_type: h.catch_type.clone(),
            })
        })
        .collect::<Result<Vec<_>, CodeError>>()?;

    Ok((writer.into_bytes(), handlers))
}

fn decode_insn(
    reader: &mut BytecodeReader<'_>,
    offset: usize,
    pool: &ConstantPool,
) -> Result<Insn, CodeError> {
    let byte = reader.read_u8()?;
    let op = Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, offset))?;

    // Jump targets are temporarily stored as absolute offsets.
    let absolute = |rel: i32| -> Result<Label, CodeError> {
        let target = offset as i64 + rel as i64;
        if target < 0 || target > u32::MAX as i64 {
            return Err(CodeError::InvalidJumpTarget { offset, target });
        }
        Ok(Label(target as u32))
    };
    let constant = |reader: &mut BytecodeReader<'_>, expected: &'static str| -> Result<(u32, Option<Constant>), CodeError> {
        let index = reader.read_u32()?;
        let entry = pool.get(index).filter(|c| c.kind() == expected).cloned();
        if entry.is_none() {
            return Err(CodeError::BadConstant { index, expected });
        }
        Ok((index, entry))
    };

    use Opcode::*;
    let insn = match op {
        Iconst => Insn::IntConst(op, reader.read_i32()?),
        Bipush => Insn::IntConst(op, reader.read_i8()? as i32),
        Sipush => Insn::IntConst(op, reader.read_i16()? as i32),
        Lconst => Insn::LongConst(reader.read_i64()?),
        Fconst => Insn::FloatConst(reader.read_f32()?),
        Dconst => Insn::DoubleConst(reader.read_f64()?),
        Ldc => match constant(reader, "string")? {
            (_, Some(Constant::Str(s))) => Insn::StringConst(s),
            (index, _) => return Err(CodeError::BadConstant { index, expected: "string" }),
        },
        Iload | Lload | Fload | Dload | Aload | Istore | Lstore | Fstore | Dstore | Astore => {
            Insn::Var(op, reader.read_u16()?)
        }
        Iinc => Insn::Iinc {
            index: reader.read_u16()?,
            delta: reader.read_i16()?,
        },
        _ if op.is_jump() => Insn::Jump(op, absolute(reader.read_i32()?)?),
        TableSwitch => {
            let low = reader.read_i32()?;
            let high = reader.read_i32()?;
            if (high as i64) < (low as i64) - 1 {
                return Err(CodeError::InvalidSwitch(offset));
            }
            let default = absolute(reader.read_i32()?)?;
            let count = (high as i64 - low as i64 + 1) as usize;
            let mut targets = Vec::with_capacity(count.min(reader.remaining() / 4));
            for _ in 0..count {
                targets.push(absolute(reader.read_i32()?)?);
            }
            Insn::TableSwitch {
                low,
                default,
                targets,
            }
        }
        New | Checkcast | InstanceOf | Anewarray => match constant(reader, "class")? {
            (_, Some(Constant::Class(name))) => Insn::Type(op, name),
            (index, _) => return Err(CodeError::BadConstant { index, expected: "class" }),
        },
        GetField | PutField => match constant(reader, "field")? {
            (_, Some(Constant::Field(field))) => Insn::Field(op, field),
            (index, _) => return Err(CodeError::BadConstant { index, expected: "field" }),
        },
        InvokeVirtual | InvokeSpecial | InvokeStatic => match constant(reader, "method")? {
            (_, Some(Constant::Method(method))) => Insn::Invoke(op, method),
            (index, _) => return Err(CodeError::BadConstant { index, expected: "method" }),
        },
        NewArray => {
            let at = reader.position();
            let tag = reader.read_u8()?;
            let kind = ArrayKind::from_u8(tag).ok_or(DecodeError::InvalidTag {
                kind: "array kind",
                tag,
                offset: at,
            })?;
            Insn::NewArray(kind)
        }
        ContEnter => Insn::Cont(ContInsn::Enter),
        ContExit => Insn::Cont(ContInsn::Exit),
        ContLabel => Insn::Cont(ContInsn::ReadLabel),
        ContClearLabel => Insn::Cont(ContInsn::ClearLabel),
        ContCallAnswer => Insn::Cont(ContInsn::CallAnswer),
        ContSetLabel => Insn::Cont(ContInsn::SetLabel(reader.read_i32()?)),
        ContMirrorIinc => Insn::Cont(ContInsn::MirrorIinc(reader.read_u16()?, reader.read_i16()?)),
        ContMirrorLocal | ContRestoreLocal => {
            let at = reader.position();
            let kind = stack_kind_at(reader.read_u8()?, at)?;
            let index = reader.read_u16()?;
            if op == ContMirrorLocal {
                Insn::Cont(ContInsn::MirrorLocal(kind, index))
            } else {
                Insn::Cont(ContInsn::RestoreLocal(kind, index))
            }
        }
        ContSaveStack | ContRestoreStack => {
            let at = reader.position();
            let kind = stack_kind_at(reader.read_u8()?, at)?;
            if op == ContSaveStack {
                Insn::Cont(ContInsn::SaveStack(kind))
            } else {
                Insn::Cont(ContInsn::RestoreStack(kind))
            }
        }
        ContSuspend => {
            let at = reader.position();
            let tag = reader.read_u8()?;
            let kind = SuspendKind::from_u8(tag).ok_or(DecodeError::InvalidTag {
                kind: "suspend kind",
                tag,
                offset: at,
            })?;
            Insn::Cont(ContInsn::Suspend(kind))
        }
        _ => Insn::Simple(op),
    };
    Ok(insn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MethodRef;
    use crate::insn::StackKind;

    fn loop_body() -> CodeBody {
        let mut body = CodeBody::new();
        let head = body.new_label();
        let exit = body.new_label();
        body.insns = vec![
            Insn::IntConst(Opcode::Iconst, 3),
            Insn::Var(Opcode::Istore, 1),
            Insn::Label(head),
            Insn::Var(Opcode::Iload, 1),
            Insn::Jump(Opcode::Ifle, exit),
            Insn::Iinc { index: 1, delta: -1 },
            Insn::Invoke(Opcode::InvokeStatic, MethodRef::new("rt/Strings", "valueOf", "(I)Ljava/lang/String;")),
            Insn::Jump(Opcode::Goto, head),
            Insn::Label(exit),
            Insn::Simple(Opcode::Return),
        ];
        body
    }

    #[test]
    fn test_encode_decode_preserves_structure() {
        let mut pool = ConstantPool::new();
        let body = loop_body();
        let (code, handlers) = encode_code(&body, &mut pool).unwrap();
        assert!(handlers.is_empty());

        let decoded = decode_code(&code, &handlers, &pool).unwrap();
        assert_eq!(decoded.insns.len(), body.insns.len());
        assert_eq!(decoded.insns, body.insns);
    }

    #[test]
    fn test_relative_jump_offsets() {
        let mut pool = ConstantPool::new();
        let (code, _) = encode_code(&loop_body(), &mut pool).unwrap();
        // iconst(5) istore(3) | head: iload(3) ifle(5) ...
        assert_eq!(code[8], Opcode::Iload.to_u8());
        assert_eq!(code[11], Opcode::Ifle.to_u8());
        let rel = i32::from_le_bytes([code[12], code[13], code[14], code[15]]);
        // exit is after iinc(5) invokestatic(5) goto(5): 11 + 5 + 15 = 31
        assert_eq!(11 + rel, 31);
    }

    #[test]
    fn test_unknown_label() {
        let mut body = CodeBody::new();
        let missing = body.new_label();
        body.insns = vec![Insn::Jump(Opcode::Goto, missing)];
        let err = encode_code(&body, &mut ConstantPool::new()).unwrap_err();
        assert_eq!(err, CodeError::UnknownLabel(missing));
    }

    #[test]
    fn test_jump_into_instruction_rejected() {
        // goto +2 lands in the middle of the goto operand
        let mut code = vec![Opcode::Goto.to_u8()];
        code.extend_from_slice(&2i32.to_le_bytes());
        let err = decode_code(&code, &[], &ConstantPool::new()).unwrap_err();
        assert!(matches!(err, CodeError::InvalidJumpTarget { target: 2, .. }));
    }

    #[test]
    fn test_handlers_use_labels() {
        let mut body = CodeBody::new();
        let start = body.new_label();
        let end = body.new_label();
        let handler = body.new_label();
        body.insns = vec![
            Insn::Label(start),
            Insn::Simple(Opcode::AconstNull),
            Insn::Simple(Opcode::Athrow),
            Insn::Label(end),
            Insn::Label(handler),
            Insn::Var(Opcode::Astore, 1),
            Insn::Simple(Opcode::Return),
        ];
        body.handlers.push(HandlerBlock {
            start,
            end,
            handler,
            catch_type: None,
        });

        let mut pool = ConstantPool::new();
        let (code, handlers) = encode_code(&body, &mut pool).unwrap();
        assert_eq!(handlers[0].start_pc, 0);
        assert_eq!(handlers[0].end_pc, 2);
        assert_eq!(handlers[0].handler_pc, 2);

        let decoded = decode_code(&code, &handlers, &pool).unwrap();
        let h = &decoded.handlers[0];
        // end and handler share an offset and therefore a label
        assert_eq!(h.end, h.handler);
    }

    #[test]
    fn test_continuation_insns() {
        let mut body = CodeBody::new();
        body.insns = vec![
            Insn::Cont(ContInsn::Enter),
            Insn::Cont(ContInsn::MirrorLocal(StackKind::Long, 2)),
            Insn::Cont(ContInsn::SetLabel(4)),
            Insn::Cont(ContInsn::Suspend(SuspendKind::Call)),
            Insn::Simple(Opcode::Return),
        ];
        let mut pool = ConstantPool::new();
        let (code, _) = encode_code(&body, &mut pool).unwrap();
        let decoded = decode_code(&code, &[], &pool).unwrap();
        assert_eq!(decoded.insns, body.insns);
    }
}
