//! Symbolic instruction list
//!
//! Method bodies are edited as a `Vec<Insn>`: branch targets are [`Label`]s
//! placed inline with [`Insn::Label`], and constant-pool operands are resolved
//! to owned strings. [`crate::code`] converts between this form and code bytes.

use crate::constants::{FieldRef, MethodRef};
use crate::encoder::DecodeError;
use crate::opcode::Opcode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in an instruction list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Storage category of a local variable or operand
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackKind {
    /// 32-bit integer (also boolean, byte, char, short)
    Int = 1,
    /// 64-bit integer
    Long = 2,
    /// 32-bit float
    Float = 3,
    /// 64-bit float
    Double = 4,
    /// Reference, possibly null
    Object = 5,
}

impl StackKind {
    /// Decode from a byte
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(StackKind::Int),
            2 => Some(StackKind::Long),
            3 => Some(StackKind::Float),
            4 => Some(StackKind::Double),
            5 => Some(StackKind::Object),
            _ => None,
        }
    }

    /// Load opcode for this category
    pub fn load_opcode(self) -> Opcode {
        match self {
            StackKind::Int => Opcode::Iload,
            StackKind::Long => Opcode::Lload,
            StackKind::Float => Opcode::Fload,
            StackKind::Double => Opcode::Dload,
            StackKind::Object => Opcode::Aload,
        }
    }

    /// Store opcode for this category
    pub fn store_opcode(self) -> Opcode {
        match self {
            StackKind::Int => Opcode::Istore,
            StackKind::Long => Opcode::Lstore,
            StackKind::Float => Opcode::Fstore,
            StackKind::Double => Opcode::Dstore,
            StackKind::Object => Opcode::Astore,
        }
    }

    /// Whether values of this kind count as two words for `Pop2`/`Dup2`
    pub fn is_wide(self) -> bool {
        matches!(self, StackKind::Long | StackKind::Double)
    }

    fn mnemonic(self) -> &'static str {
        match self {
            StackKind::Int => "int",
            StackKind::Long => "long",
            StackKind::Float => "float",
            StackKind::Double => "double",
            StackKind::Object => "object",
        }
    }
}

/// Which suspension flavor a `ContSuspend` performs
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendKind {
    /// Suspend and resume at the same point later
    Pause = 0,
    /// Suspend so that the previous continuation is re-entered
    StepBack = 1,
    /// Suspend and run another continuable whose answer resumes this one
    Call = 2,
    /// Deliver a value to the continuation that issued a call
    Answer = 3,
}

impl SuspendKind {
    /// Decode from a byte
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(SuspendKind::Pause),
            1 => Some(SuspendKind::StepBack),
            2 => Some(SuspendKind::Call),
            3 => Some(SuspendKind::Answer),
            _ => None,
        }
    }

    /// Lower-case name
    pub fn name(self) -> &'static str {
        match self {
            SuspendKind::Pause => "pause",
            SuspendKind::StepBack => "step_back",
            SuspendKind::Call => "call",
            SuspendKind::Answer => "answer",
        }
    }
}

/// Element type of a primitive array created with `NewArray`
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    /// `boolean[]`
    Boolean = 4,
    /// `char[]`
    Char = 5,
    /// `float[]`
    Float = 6,
    /// `double[]`
    Double = 7,
    /// `byte[]`
    Byte = 8,
    /// `short[]`
    Short = 9,
    /// `int[]`
    Int = 10,
    /// `long[]`
    Long = 11,
}

impl ArrayKind {
    /// Decode from a byte
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            4 => Some(ArrayKind::Boolean),
            5 => Some(ArrayKind::Char),
            6 => Some(ArrayKind::Float),
            7 => Some(ArrayKind::Double),
            8 => Some(ArrayKind::Byte),
            9 => Some(ArrayKind::Short),
            10 => Some(ArrayKind::Int),
            11 => Some(ArrayKind::Long),
            _ => None,
        }
    }

    /// Descriptor of the resulting array type
    pub fn descriptor(self) -> &'static str {
        match self {
            ArrayKind::Boolean => "[Z",
            ArrayKind::Char => "[C",
            ArrayKind::Float => "[F",
            ArrayKind::Double => "[D",
            ArrayKind::Byte => "[B",
            ArrayKind::Short => "[S",
            ArrayKind::Int => "[I",
            ArrayKind::Long => "[J",
        }
    }

    /// Storage category of the elements
    pub fn element_kind(self) -> StackKind {
        match self {
            ArrayKind::Float => StackKind::Float,
            ArrayKind::Double => StackKind::Double,
            ArrayKind::Long => StackKind::Long,
            _ => StackKind::Int,
        }
    }
}

/// Continuation support instructions
///
/// These operate on the *active* continuation context of the executing
/// frame. They are only ever emitted by the instrumentation.
#[derive(Debug, Clone, PartialEq)]
pub enum ContInsn {
    /// Create or reset the context for `this` and make it active
    Enter,
    /// Register the context as terminal and deactivate it
    Exit,
    /// Push the resume label of the active context
    ReadLabel,
    /// Set the resume label
    SetLabel(i32),
    /// Reset the resume label to -1
    ClearLabel,
    /// Copy local `index` of the current frame into the context locals
    MirrorLocal(StackKind, u16),
    /// Add a delta to a mirrored int local
    MirrorIinc(u16, i16),
    /// Pop an operand and push it onto the context stack
    SaveStack(StackKind),
    /// Pop a value from the context stack and push it as an operand
    RestoreStack(StackKind),
    /// Push the saved value of a context local
    RestoreLocal(StackKind, u16),
    /// Suspend the frame
    Suspend(SuspendKind),
    /// Push the answer delivered to a call continuation
    CallAnswer,
}

impl ContInsn {
    /// Opcode used to encode this instruction
    pub fn opcode(&self) -> Opcode {
        match self {
            ContInsn::Enter => Opcode::ContEnter,
            ContInsn::Exit => Opcode::ContExit,
            ContInsn::ReadLabel => Opcode::ContLabel,
            ContInsn::SetLabel(_) => Opcode::ContSetLabel,
            ContInsn::ClearLabel => Opcode::ContClearLabel,
            ContInsn::MirrorLocal(..) => Opcode::ContMirrorLocal,
            ContInsn::MirrorIinc(..) => Opcode::ContMirrorIinc,
            ContInsn::SaveStack(_) => Opcode::ContSaveStack,
            ContInsn::RestoreStack(_) => Opcode::ContRestoreStack,
            ContInsn::RestoreLocal(..) => Opcode::ContRestoreLocal,
            ContInsn::Suspend(_) => Opcode::ContSuspend,
            ContInsn::CallAnswer => Opcode::ContCallAnswer,
        }
    }
}

/// One instruction of a method body
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    /// Marks a branch target; occupies no bytes
    Label(Label),
    /// Any opcode without operands
    Simple(Opcode),
    /// `Iconst`, `Bipush` or `Sipush`
    IntConst(Opcode, i32),
    /// `Lconst`
    LongConst(i64),
    /// `Fconst`
    FloatConst(f32),
    /// `Dconst`
    DoubleConst(f64),
    /// `Ldc` of a string literal
    StringConst(String),
    /// Typed local load or store
    Var(Opcode, u16),
    /// `Iinc`
    Iinc {
        /// Local index
        index: u16,
        /// Increment
        delta: i16,
    },
    /// Conditional or unconditional jump
    Jump(Opcode, Label),
    /// `TableSwitch` over `low..low + targets.len()`
    TableSwitch {
        /// Key of the first target
        low: i32,
        /// Target for keys outside the range
        default: Label,
        /// One target per key
        targets: Vec<Label>,
    },
    /// `New`, `Checkcast`, `InstanceOf` or `Anewarray` with a class name
    Type(Opcode, String),
    /// `GetField` or `PutField`
    Field(Opcode, FieldRef),
    /// `InvokeVirtual`, `InvokeSpecial` or `InvokeStatic`
    Invoke(Opcode, MethodRef),
    /// `NewArray`
    NewArray(ArrayKind),
    /// Continuation support instruction
    Cont(ContInsn),
}

impl Insn {
    /// Opcode of this instruction, `None` for labels
    pub fn opcode(&self) -> Option<Opcode> {
        Some(match self {
            Insn::Label(_) => return None,
            Insn::Simple(op)
            | Insn::IntConst(op, _)
            | Insn::Var(op, _)
            | Insn::Jump(op, _)
            | Insn::Type(op, _)
            | Insn::Field(op, _)
            | Insn::Invoke(op, _) => *op,
            Insn::LongConst(_) => Opcode::Lconst,
            Insn::FloatConst(_) => Opcode::Fconst,
            Insn::DoubleConst(_) => Opcode::Dconst,
            Insn::StringConst(_) => Opcode::Ldc,
            Insn::Iinc { .. } => Opcode::Iinc,
            Insn::TableSwitch { .. } => Opcode::TableSwitch,
            Insn::NewArray(_) => Opcode::NewArray,
            Insn::Cont(c) => c.opcode(),
        })
    }

    /// Number of bytes this instruction occupies when encoded
    pub fn encoded_len(&self) -> usize {
        match self {
            Insn::Label(_) => 0,
            Insn::Simple(_) => 1,
            Insn::IntConst(Opcode::Bipush, _) => 2,
            Insn::IntConst(Opcode::Sipush, _) => 3,
            Insn::IntConst(..) => 5,
            Insn::LongConst(_) | Insn::DoubleConst(_) => 9,
            Insn::FloatConst(_) | Insn::StringConst(_) => 5,
            Insn::Var(..) => 3,
            Insn::Iinc { .. } => 5,
            Insn::Jump(..) => 5,
            Insn::TableSwitch { targets, .. } => 1 + 12 + 4 * targets.len(),
            Insn::Type(..) | Insn::Field(..) | Insn::Invoke(..) => 5,
            Insn::NewArray(_) => 2,
            Insn::Cont(c) => match c {
                ContInsn::SetLabel(_) => 5,
                ContInsn::MirrorLocal(..) | ContInsn::RestoreLocal(..) => 4,
                ContInsn::MirrorIinc(..) => 5,
                ContInsn::SaveStack(_) | ContInsn::RestoreStack(_) | ContInsn::Suspend(_) => 2,
                _ => 1,
            },
        }
    }

    /// Whether control never falls through past this instruction
    pub fn is_terminator(&self) -> bool {
        self.opcode().map(Opcode::is_terminator).unwrap_or(false)
    }

    /// Labels this instruction may transfer control to
    pub fn branch_targets(&self) -> Vec<Label> {
        match self {
            Insn::Jump(_, label) => vec![*label],
            Insn::TableSwitch {
                default, targets, ..
            } => {
                let mut all = Vec::with_capacity(targets.len() + 1);
                all.push(*default);
                all.extend(targets.iter().copied());
                all
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.opcode().map(Opcode::name).unwrap_or("");
        match self {
            Insn::Label(label) => write!(f, "{}:", label),
            Insn::Simple(_) => f.write_str(name),
            Insn::IntConst(_, v) => write!(f, "{} {}", name, v),
            Insn::LongConst(v) => write!(f, "{} {}", name, v),
            Insn::FloatConst(v) => write!(f, "{} {}", name, v),
            Insn::DoubleConst(v) => write!(f, "{} {}", name, v),
            Insn::StringConst(s) => write!(f, "{} {:?}", name, s),
            Insn::Var(_, idx) => write!(f, "{} {}", name, idx),
            Insn::Iinc { index, delta } => write!(f, "{} {} {}", name, index, delta),
            Insn::Jump(_, label) => write!(f, "{} {}", name, label),
            Insn::TableSwitch {
                low,
                default,
                targets,
            } => {
                write!(f, "{} {}..", name, low)?;
                for t in targets {
                    write!(f, " {}", t)?;
                }
                write!(f, " default {}", default)
            }
            Insn::Type(_, class) => write!(f, "{} {}", name, class),
            Insn::Field(_, field) => {
                write!(f, "{} {}.{}:{}", name, field.owner, field.name, field.descriptor)
            }
            Insn::Invoke(_, method) => write!(f, "{} {}", name, method),
            Insn::NewArray(kind) => write!(f, "{} {}", name, kind.descriptor()),
            Insn::Cont(c) => match c {
                ContInsn::SetLabel(l) => write!(f, "{} {}", name, l),
                ContInsn::MirrorLocal(k, i) | ContInsn::RestoreLocal(k, i) => {
                    write!(f, "{} {} {}", name, k.mnemonic(), i)
                }
                ContInsn::MirrorIinc(i, d) => write!(f, "{} {} {}", name, i, d),
                ContInsn::SaveStack(k) | ContInsn::RestoreStack(k) => {
                    write!(f, "{} {}", name, k.mnemonic())
                }
                ContInsn::Suspend(kind) => write!(f, "{} {}", name, kind.name()),
                _ => f.write_str(name),
            },
        }
    }
}

pub(crate) fn stack_kind_at(byte: u8, offset: usize) -> Result<StackKind, DecodeError> {
    StackKind::from_u8(byte).ok_or(DecodeError::InvalidTag {
        kind: "stack kind",
        tag: byte,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_lengths() {
        assert_eq!(Insn::Label(Label(0)).encoded_len(), 0);
        assert_eq!(Insn::IntConst(Opcode::Bipush, 3).encoded_len(), 2);
        assert_eq!(Insn::IntConst(Opcode::Iconst, 3).encoded_len(), 5);
        assert_eq!(
            Insn::TableSwitch {
                low: 0,
                default: Label(0),
                targets: vec![Label(1), Label(2)],
            }
            .encoded_len(),
            21
        );
        assert_eq!(Insn::Cont(ContInsn::RestoreLocal(StackKind::Int, 3)).encoded_len(), 4);
    }

    #[test]
    fn test_branch_targets() {
        let switch = Insn::TableSwitch {
            low: 0,
            default: Label(9),
            targets: vec![Label(1), Label(2)],
        };
        assert_eq!(switch.branch_targets(), vec![Label(9), Label(1), Label(2)]);
        assert!(switch.is_terminator());
        assert!(Insn::Jump(Opcode::Ifeq, Label(3)).branch_targets() == vec![Label(3)]);
    }

    #[test]
    fn test_display() {
        let insn = Insn::Invoke(Opcode::InvokeVirtual, MethodRef::new("a/B", "pause", "()V"));
        assert_eq!(insn.to_string(), "invokevirtual a/B.pause()V");
        assert_eq!(
            Insn::Cont(ContInsn::Suspend(SuspendKind::StepBack)).to_string(),
            "cont_suspend step_back"
        );
    }
}
