//! Bytecode opcodes for the Rewind VM
//!
//! The instruction set is a typed stack machine in the spirit of the JVM:
//! every value category (int, long, float, double, reference) has its own
//! load/store/arithmetic opcodes so that the type of every stack slot and
//! local variable can be inferred statically.
//!
//! Opcodes are organized into categories:
//! - 0x00-0x0F: Constants
//! - 0x10-0x1F: Local variables
//! - 0x20-0x2F: Operand stack manipulation
//! - 0x30-0x4F: Arithmetic
//! - 0x50-0x5F: Conversions & comparisons
//! - 0x60-0x7F: Control flow
//! - 0x80-0x8F: Objects & invocation
//! - 0x90-0x9F: Arrays
//! - 0xA0-0xAF: Returns & exceptions
//! - 0xE0-0xEF: Continuation support (emitted by the instrumentation only)

/// Bytecode opcode enumeration
///
/// All opcodes are single-byte instructions. Operands, when present, follow
/// the opcode byte in little-endian order.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Push null reference
    AconstNull = 0x01,
    /// Push 32-bit integer constant (operand: i32)
    Iconst = 0x02,
    /// Push byte constant widened to int (operand: i8)
    Bipush = 0x03,
    /// Push short constant widened to int (operand: i16)
    Sipush = 0x04,
    /// Push 64-bit integer constant (operand: i64)
    Lconst = 0x05,
    /// Push 32-bit float constant (operand: f32)
    Fconst = 0x06,
    /// Push 64-bit float constant (operand: f64)
    Dconst = 0x07,
    /// Push string constant from pool (operand: u32 index)
    Ldc = 0x08,

    // ===== Local Variables (0x10-0x1F) =====
    /// Load int local (operand: u16 index)
    Iload = 0x10,
    /// Load long local (operand: u16 index)
    Lload = 0x11,
    /// Load float local (operand: u16 index)
    Fload = 0x12,
    /// Load double local (operand: u16 index)
    Dload = 0x13,
    /// Load reference local (operand: u16 index)
    Aload = 0x14,
    /// Store int local (operand: u16 index)
    Istore = 0x15,
    /// Store long local (operand: u16 index)
    Lstore = 0x16,
    /// Store float local (operand: u16 index)
    Fstore = 0x17,
    /// Store double local (operand: u16 index)
    Dstore = 0x18,
    /// Store reference local (operand: u16 index)
    Astore = 0x19,
    /// Increment int local (operands: u16 index, i16 increment)
    Iinc = 0x1A,

    // ===== Operand Stack (0x20-0x2F) =====
    /// Pop top value
    Pop = 0x20,
    /// Pop one category-2 value or two category-1 values
    Pop2 = 0x21,
    /// Duplicate top value
    Dup = 0x22,
    /// Duplicate top value and insert it beneath the second value
    DupX1 = 0x23,
    /// Duplicate top value and insert it beneath the second and third values
    DupX2 = 0x24,
    /// Duplicate one category-2 value or two category-1 values
    Dup2 = 0x25,
    /// Swap top two values
    Swap = 0x26,

    // ===== Arithmetic (0x30-0x4F) =====
    /// Int addition
    Iadd = 0x30,
    /// Int subtraction
    Isub = 0x31,
    /// Int multiplication
    Imul = 0x32,
    /// Int division
    Idiv = 0x33,
    /// Int remainder
    Irem = 0x34,
    /// Int negation
    Ineg = 0x35,
    /// Int bitwise and
    Iand = 0x36,
    /// Int bitwise or
    Ior = 0x37,
    /// Int bitwise xor
    Ixor = 0x38,
    /// Int shift left
    Ishl = 0x39,
    /// Int arithmetic shift right
    Ishr = 0x3A,
    /// Long addition
    Ladd = 0x3B,
    /// Long subtraction
    Lsub = 0x3C,
    /// Long multiplication
    Lmul = 0x3D,
    /// Long division
    Ldiv = 0x3E,
    /// Long negation
    Lneg = 0x3F,
    /// Float addition
    Fadd = 0x40,
    /// Float subtraction
    Fsub = 0x41,
    /// Float multiplication
    Fmul = 0x42,
    /// Float division
    Fdiv = 0x43,
    /// Float negation
    Fneg = 0x44,
    /// Double addition
    Dadd = 0x45,
    /// Double subtraction
    Dsub = 0x46,
    /// Double multiplication
    Dmul = 0x47,
    /// Double division
    Ddiv = 0x48,
    /// Double negation
    Dneg = 0x49,

    // ===== Conversions & Comparisons (0x50-0x5F) =====
    /// int -> long
    I2l = 0x50,
    /// int -> float
    I2f = 0x51,
    /// int -> double
    I2d = 0x52,
    /// long -> int
    L2i = 0x53,
    /// long -> float
    L2f = 0x54,
    /// long -> double
    L2d = 0x55,
    /// float -> int
    F2i = 0x56,
    /// float -> long
    F2l = 0x57,
    /// float -> double
    F2d = 0x58,
    /// double -> int
    D2i = 0x59,
    /// double -> long
    D2l = 0x5A,
    /// double -> float
    D2f = 0x5B,
    /// int -> byte
    I2b = 0x5C,
    /// int -> char
    I2c = 0x5D,
    /// int -> short
    I2s = 0x5E,
    /// Compare longs, push -1/0/1
    Lcmp = 0x5F,

    // ===== Control Flow (0x60-0x7F) =====
    /// Compare floats, push -1/0/1 (NaN -> -1)
    Fcmpl = 0x60,
    /// Compare doubles, push -1/0/1 (NaN -> -1)
    Dcmpl = 0x61,
    /// Jump if int == 0 (operand: i32 relative offset)
    Ifeq = 0x62,
    /// Jump if int != 0
    Ifne = 0x63,
    /// Jump if int < 0
    Iflt = 0x64,
    /// Jump if int >= 0
    Ifge = 0x65,
    /// Jump if int > 0
    Ifgt = 0x66,
    /// Jump if int <= 0
    Ifle = 0x67,
    /// Jump if ints are equal
    IfIcmpeq = 0x68,
    /// Jump if ints differ
    IfIcmpne = 0x69,
    /// Jump if int a < b
    IfIcmplt = 0x6A,
    /// Jump if int a >= b
    IfIcmpge = 0x6B,
    /// Jump if int a > b
    IfIcmpgt = 0x6C,
    /// Jump if int a <= b
    IfIcmple = 0x6D,
    /// Jump if references are identical
    IfAcmpeq = 0x6E,
    /// Jump if references differ
    IfAcmpne = 0x6F,
    /// Jump if reference is null
    Ifnull = 0x70,
    /// Jump if reference is not null
    Ifnonnull = 0x71,
    /// Unconditional jump (operand: i32 relative offset)
    Goto = 0x72,
    /// Table switch (operands: i32 low, i32 high, i32 default, then one i32 per key)
    TableSwitch = 0x73,

    // ===== Objects & Invocation (0x80-0x8F) =====
    /// Allocate instance (operand: u32 class constant)
    New = 0x80,
    /// Read instance field (operand: u32 field constant)
    GetField = 0x81,
    /// Write instance field (operand: u32 field constant)
    PutField = 0x82,
    /// Check reference type (operand: u32 class constant)
    Checkcast = 0x83,
    /// Test reference type, push int (operand: u32 class constant)
    InstanceOf = 0x84,
    /// Invoke a virtual method (operand: u32 method constant)
    InvokeVirtual = 0x85,
    /// Invoke a method without virtual dispatch (operand: u32 method constant)
    InvokeSpecial = 0x86,
    /// Invoke a static method (operand: u32 method constant)
    InvokeStatic = 0x87,

    // ===== Arrays (0x90-0x9F) =====
    /// Allocate primitive array (operand: u8 element kind)
    NewArray = 0x90,
    /// Allocate reference array (operand: u32 class constant)
    Anewarray = 0x91,
    /// Push array length
    ArrayLength = 0x92,
    /// Load int element
    Iaload = 0x93,
    /// Load long element
    Laload = 0x94,
    /// Load float element
    Faload = 0x95,
    /// Load double element
    Daload = 0x96,
    /// Load reference element
    Aaload = 0x97,
    /// Store int element
    Iastore = 0x98,
    /// Store long element
    Lastore = 0x99,
    /// Store float element
    Fastore = 0x9A,
    /// Store double element
    Dastore = 0x9B,
    /// Store reference element
    Aastore = 0x9C,

    // ===== Returns & Exceptions (0xA0-0xAF) =====
    /// Return void
    Return = 0xA0,
    /// Return int
    Ireturn = 0xA1,
    /// Return long
    Lreturn = 0xA2,
    /// Return float
    Freturn = 0xA3,
    /// Return double
    Dreturn = 0xA4,
    /// Return reference
    Areturn = 0xA5,
    /// Throw reference on top of stack
    Athrow = 0xA6,

    // ===== Continuation Support (0xE0-0xEF) =====
    /// Create or reset the continuation context for `this`
    ContEnter = 0xE0,
    /// Register and deactivate the continuation context before returning
    ContExit = 0xE1,
    /// Push the resume label of the active context
    ContLabel = 0xE2,
    /// Set the resume label (operand: i32 label)
    ContSetLabel = 0xE3,
    /// Reset the resume label to -1
    ContClearLabel = 0xE4,
    /// Mirror a local store into the context (operands: u8 kind, u16 index)
    ContMirrorLocal = 0xE5,
    /// Mirror an `Iinc` into the context (operands: u16 index, i16 increment)
    ContMirrorIinc = 0xE6,
    /// Pop an operand into the context stack (operand: u8 kind)
    ContSaveStack = 0xE7,
    /// Pop an operand from the context stack and push it (operand: u8 kind)
    ContRestoreStack = 0xE8,
    /// Push a saved local from the context (operands: u8 kind, u16 index)
    ContRestoreLocal = 0xE9,
    /// Suspend execution (operand: u8 suspension kind)
    ContSuspend = 0xEA,
    /// Push the answer delivered to a call continuation
    ContCallAnswer = 0xEB,
}

impl Opcode {
    /// Convert a byte to an opcode
    ///
    /// Returns `None` if the byte doesn't correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        use Opcode::*;
        let opcode = match byte {
            0x00 => Nop,
            0x01 => AconstNull,
            0x02 => Iconst,
            0x03 => Bipush,
            0x04 => Sipush,
            0x05 => Lconst,
            0x06 => Fconst,
            0x07 => Dconst,
            0x08 => Ldc,
            0x10 => Iload,
            0x11 => Lload,
            0x12 => Fload,
            0x13 => Dload,
            0x14 => Aload,
            0x15 => Istore,
            0x16 => Lstore,
            0x17 => Fstore,
            0x18 => Dstore,
            0x19 => Astore,
            0x1A => Iinc,
            0x20 => Pop,
            0x21 => Pop2,
            0x22 => Dup,
            0x23 => DupX1,
            0x24 => DupX2,
            0x25 => Dup2,
            0x26 => Swap,
            0x30 => Iadd,
            0x31 => Isub,
            0x32 => Imul,
            0x33 => Idiv,
            0x34 => Irem,
            0x35 => Ineg,
            0x36 => Iand,
            0x37 => Ior,
            0x38 => Ixor,
            0x39 => Ishl,
            0x3A => Ishr,
            0x3B => Ladd,
            0x3C => Lsub,
            0x3D => Lmul,
            0x3E => Ldiv,
            0x3F => Lneg,
            0x40 => Fadd,
            0x41 => Fsub,
            0x42 => Fmul,
            0x43 => Fdiv,
            0x44 => Fneg,
            0x45 => Dadd,
            0x46 => Dsub,
            0x47 => Dmul,
            0x48 => Ddiv,
            0x49 => Dneg,
            0x50 => I2l,
            0x51 => I2f,
            0x52 => I2d,
            0x53 => L2i,
            0x54 => L2f,
            0x55 => L2d,
            0x56 => F2i,
            0x57 => F2l,
            0x58 => F2d,
            0x59 => D2i,
            0x5A => D2l,
            0x5B => D2f,
            0x5C => I2b,
            0x5D => I2c,
            0x5E => I2s,
            0x5F => Lcmp,
            0x60 => Fcmpl,
            0x61 => Dcmpl,
            0x62 => Ifeq,
            0x63 => Ifne,
            0x64 => Iflt,
            0x65 => Ifge,
            0x66 => Ifgt,
            0x67 => Ifle,
            0x68 => IfIcmpeq,
            0x69 => IfIcmpne,
            0x6A => IfIcmplt,
            0x6B => IfIcmpge,
            0x6C => IfIcmpgt,
            0x6D => IfIcmple,
            0x6E => IfAcmpeq,
            0x6F => IfAcmpne,
            0x70 => Ifnull,
            0x71 => Ifnonnull,
            0x72 => Goto,
            0x73 => TableSwitch,
            0x80 => New,
            0x81 => GetField,
            0x82 => PutField,
            0x83 => Checkcast,
            0x84 => InstanceOf,
            0x85 => InvokeVirtual,
            0x86 => InvokeSpecial,
            0x87 => InvokeStatic,
            0x90 => NewArray,
            0x91 => Anewarray,
            0x92 => ArrayLength,
            0x93 => Iaload,
            0x94 => Laload,
            0x95 => Faload,
            0x96 => Daload,
            0x97 => Aaload,
            0x98 => Iastore,
            0x99 => Lastore,
            0x9A => Fastore,
            0x9B => Dastore,
            0x9C => Aastore,
            0xA0 => Return,
            0xA1 => Ireturn,
            0xA2 => Lreturn,
            0xA3 => Freturn,
            0xA4 => Dreturn,
            0xA5 => Areturn,
            0xA6 => Athrow,
            0xE0 => ContEnter,
            0xE1 => ContExit,
            0xE2 => ContLabel,
            0xE3 => ContSetLabel,
            0xE4 => ContClearLabel,
            0xE5 => ContMirrorLocal,
            0xE6 => ContMirrorIinc,
            0xE7 => ContSaveStack,
            0xE8 => ContRestoreStack,
            0xE9 => ContRestoreLocal,
            0xEA => ContSuspend,
            0xEB => ContCallAnswer,
            _ => return None,
        };
        Some(opcode)
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the mnemonic of this opcode
    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Nop => "nop",
            AconstNull => "aconst_null",
            Iconst => "iconst",
            Bipush => "bipush",
            Sipush => "sipush",
            Lconst => "lconst",
            Fconst => "fconst",
            Dconst => "dconst",
            Ldc => "ldc",
            Iload => "iload",
            Lload => "lload",
            Fload => "fload",
            Dload => "dload",
            Aload => "aload",
            Istore => "istore",
            Lstore => "lstore",
            Fstore => "fstore",
            Dstore => "dstore",
            Astore => "astore",
            Iinc => "iinc",
            Pop => "pop",
            Pop2 => "pop2",
            Dup => "dup",
            DupX1 => "dup_x1",
            DupX2 => "dup_x2",
            Dup2 => "dup2",
            Swap => "swap",
            Iadd => "iadd",
            Isub => "isub",
            Imul => "imul",
            Idiv => "idiv",
            Irem => "irem",
            Ineg => "ineg",
            Iand => "iand",
            Ior => "ior",
            Ixor => "ixor",
            Ishl => "ishl",
            Ishr => "ishr",
            Ladd => "ladd",
            Lsub => "lsub",
            Lmul => "lmul",
            Ldiv => "ldiv",
            Lneg => "lneg",
            Fadd => "fadd",
            Fsub => "fsub",
            Fmul => "fmul",
            Fdiv => "fdiv",
            Fneg => "fneg",
            Dadd => "dadd",
            Dsub => "dsub",
            Dmul => "dmul",
            Ddiv => "ddiv",
            Dneg => "dneg",
            I2l => "i2l",
            I2f => "i2f",
            I2d => "i2d",
            L2i => "l2i",
            L2f => "l2f",
            L2d => "l2d",
            F2i => "f2i",
            F2l => "f2l",
            F2d => "f2d",
            D2i => "d2i",
            D2l => "d2l",
            D2f => "d2f",
            I2b => "i2b",
            I2c => "i2c",
            I2s => "i2s",
            Lcmp => "lcmp",
            Fcmpl => "fcmpl",
            Dcmpl => "dcmpl",
            Ifeq => "ifeq",
            Ifne => "ifne",
            Iflt => "iflt",
            Ifge => "ifge",
            Ifgt => "ifgt",
            Ifle => "ifle",
            IfIcmpeq => "if_icmpeq",
            IfIcmpne => "if_icmpne",
            IfIcmplt => "if_icmplt",
            IfIcmpge => "if_icmpge",
            IfIcmpgt => "if_icmpgt",
            IfIcmple => "if_icmple",
            IfAcmpeq => "if_acmpeq",
            IfAcmpne => "if_acmpne",
            Ifnull => "ifnull",
            Ifnonnull => "ifnonnull",
            Goto => "goto",
            TableSwitch => "tableswitch",
            New => "new",
            GetField => "getfield",
            PutField => "putfield",
            Checkcast => "checkcast",
            InstanceOf => "instanceof",
            InvokeVirtual => "invokevirtual",
            InvokeSpecial => "invokespecial",
            InvokeStatic => "invokestatic",
            NewArray => "newarray",
            Anewarray => "anewarray",
            ArrayLength => "arraylength",
            Iaload => "iaload",
            Laload => "laload",
            Faload => "faload",
            Daload => "daload",
            Aaload => "aaload",
            Iastore => "iastore",
            Lastore => "lastore",
            Fastore => "fastore",
            Dastore => "dastore",
            Aastore => "aastore",
            Return => "return",
            Ireturn => "ireturn",
            Lreturn => "lreturn",
            Freturn => "freturn",
            Dreturn => "dreturn",
            Areturn => "areturn",
            Athrow => "athrow",
            ContEnter => "cont_enter",
            ContExit => "cont_exit",
            ContLabel => "cont_label",
            ContSetLabel => "cont_set_label",
            ContClearLabel => "cont_clear_label",
            ContMirrorLocal => "cont_mirror_local",
            ContMirrorIinc => "cont_mirror_iinc",
            ContSaveStack => "cont_save_stack",
            ContRestoreStack => "cont_restore_stack",
            ContRestoreLocal => "cont_restore_local",
            ContSuspend => "cont_suspend",
            ContCallAnswer => "cont_call_answer",
        }
    }

    /// Check if this opcode is a conditional or unconditional jump
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::Ifeq
                | Opcode::Ifne
                | Opcode::Iflt
                | Opcode::Ifge
                | Opcode::Ifgt
                | Opcode::Ifle
                | Opcode::IfIcmpeq
                | Opcode::IfIcmpne
                | Opcode::IfIcmplt
                | Opcode::IfIcmpge
                | Opcode::IfIcmpgt
                | Opcode::IfIcmple
                | Opcode::IfAcmpeq
                | Opcode::IfAcmpne
                | Opcode::Ifnull
                | Opcode::Ifnonnull
                | Opcode::Goto
        )
    }

    /// Check if this opcode is a method invocation
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Opcode::InvokeVirtual | Opcode::InvokeSpecial | Opcode::InvokeStatic
        )
    }

    /// Check if this opcode is a return instruction
    pub fn is_return(self) -> bool {
        matches!(
            self,
            Opcode::Return
                | Opcode::Ireturn
                | Opcode::Lreturn
                | Opcode::Freturn
                | Opcode::Dreturn
                | Opcode::Areturn
        )
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        self.is_return()
            || matches!(self, Opcode::Goto | Opcode::TableSwitch | Opcode::Athrow)
    }

    /// Check if this opcode belongs to the continuation support range
    pub fn is_continuation(self) -> bool {
        (0xE0..=0xEF).contains(&self.to_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0u8..=255 {
            if let Some(opcode) = Opcode::from_u8(byte) {
                assert_eq!(opcode.to_u8(), byte);
            }
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_u8(0x0F), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_opcode_names() {
        assert_eq!(Opcode::Iload.name(), "iload");
        assert_eq!(Opcode::IfIcmplt.name(), "if_icmplt");
        assert_eq!(Opcode::ContSuspend.name(), "cont_suspend");
    }

    #[test]
    fn test_terminator_detection() {
        assert!(Opcode::Return.is_terminator());
        assert!(Opcode::Goto.is_terminator());
        assert!(Opcode::Athrow.is_terminator());
        assert!(Opcode::TableSwitch.is_terminator());
        assert!(!Opcode::Ifeq.is_terminator());
        assert!(!Opcode::Iadd.is_terminator());
    }

    #[test]
    fn test_continuation_range() {
        assert!(Opcode::ContEnter.is_continuation());
        assert!(Opcode::ContCallAnswer.is_continuation());
        assert!(!Opcode::InvokeVirtual.is_continuation());
    }
}
