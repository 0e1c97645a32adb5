//! Abstract effects of instructions on a type frame
//!
//! Every instruction lowers to a short list of [`TypesOpcode`]s that a
//! [`super::TypesContext`] applies in order. Only the shape of the frame
//! matters here, not values.

use super::lattice::{SlotType, STRING_CLASS};
use rewind_bytecode::{FieldType, Insn, MethodDescriptor, Opcode, StackKind, SuspendKind};

/// One abstract frame operation
#[derive(Debug, Clone, PartialEq)]
pub enum TypesOpcode {
    /// Push a value of the given type
    Push(SlotType),
    /// Pop one value
    Pop,
    /// Pop one wide value or two narrow ones
    Pop2,
    /// Duplicate the top value
    Dup,
    /// Duplicate the top value beneath the second
    DupX1,
    /// Duplicate the top value beneath the second and third (or a wide second)
    DupX2,
    /// Duplicate one wide value or two narrow ones
    Dup2,
    /// Swap the top two values
    Swap,
    /// Pop into a local
    Set(u16),
    /// Push a local, `StackKind` used if the local was never written
    Get(u16, StackKind),
    /// Make a local an int
    Iinc(u16),
    /// Pop index and array, push the element type
    ArrayElement,
    /// A suspension point; the frame is captured before the call's effects
    Suspend(SuspendKind),
}

/// Why an instruction could not be lowered
#[derive(Debug, Clone, PartialEq)]
pub enum LowerError {
    /// Continuation opcodes only appear in code that was already rewritten
    AlreadyInstrumented,
    /// A descriptor didn't parse
    Descriptor(String),
}

fn pops(n: usize) -> impl Iterator<Item = TypesOpcode> {
    std::iter::repeat(TypesOpcode::Pop).take(n)
}

fn unary(result: SlotType) -> Vec<TypesOpcode> {
    vec![TypesOpcode::Pop, TypesOpcode::Push(result)]
}

fn binary(result: SlotType) -> Vec<TypesOpcode> {
    vec![TypesOpcode::Pop, TypesOpcode::Pop, TypesOpcode::Push(result)]
}

/// Effects of an operand-less opcode
fn lower_simple(op: Opcode) -> Vec<TypesOpcode> {
    use Opcode::*;
    use SlotType as T;
    match op {
        Nop => Vec::new(),
        AconstNull => vec![TypesOpcode::Push(T::Null)],
        Pop => vec![TypesOpcode::Pop],
        Pop2 => vec![TypesOpcode::Pop2],
        Dup => vec![TypesOpcode::Dup],
        DupX1 => vec![TypesOpcode::DupX1],
        DupX2 => vec![TypesOpcode::DupX2],
        Dup2 => vec![TypesOpcode::Dup2],
        Swap => vec![TypesOpcode::Swap],

        Iadd | Isub | Imul | Idiv | Irem | Iand | Ior | Ixor | Ishl | Ishr => binary(T::Int),
        Ladd | Lsub | Lmul | Ldiv => binary(T::Long),
        Fadd | Fsub | Fmul | Fdiv => binary(T::Float),
        Dadd | Dsub | Dmul | Ddiv => binary(T::Double),
        Ineg => unary(T::Int),
        Lneg => unary(T::Long),
        Fneg => unary(T::Float),
        Dneg => unary(T::Double),

        L2i | F2i | D2i => unary(T::Int),
        I2l | F2l | D2l => unary(T::Long),
        I2f | L2f | D2f => unary(T::Float),
        I2d | L2d | F2d => unary(T::Double),
        I2b => unary(T::Byte),
        I2c => unary(T::Char),
        I2s => unary(T::Short),
        Lcmp | Fcmpl | Dcmpl => binary(T::Int),

        ArrayLength => unary(T::Int),
        Iaload => binary(T::Int),
        Laload => binary(T::Long),
        Faload => binary(T::Float),
        Daload => binary(T::Double),
        Aaload => vec![TypesOpcode::ArrayElement],
        Iastore | Lastore | Fastore | Dastore | Aastore => pops(3).collect(),

        Return => Vec::new(),
        Ireturn | Lreturn | Freturn | Dreturn | Areturn | Athrow => vec![TypesOpcode::Pop],

        // Operand-carrying opcodes never appear as `Insn::Simple`.
        _ => Vec::new(),
    }
}

fn jump_pops(op: Opcode) -> usize {
    match op {
        Opcode::Goto => 0,
        Opcode::IfIcmpeq
        | Opcode::IfIcmpne
        | Opcode::IfIcmplt
        | Opcode::IfIcmpge
        | Opcode::IfIcmpgt
        | Opcode::IfIcmple
        | Opcode::IfAcmpeq
        | Opcode::IfAcmpne => 2,
        _ => 1,
    }
}

/// Class name of a reference array whose elements are `element`
pub fn array_of(element: &str) -> String {
    if element.starts_with('[') {
        format!("[{}", element)
    } else {
        format!("[L{};", element)
    }
}

/// Lower one instruction
///
/// `suspend` is the suspension flavor of an invocation, when the caller has
/// classified it as one.
pub fn lower(insn: &Insn, suspend: Option<SuspendKind>) -> Result<Vec<TypesOpcode>, LowerError> {
    use SlotType as T;
    let ops = match insn {
        Insn::Label(_) => Vec::new(),
        Insn::Simple(op) => lower_simple(*op),
        Insn::IntConst(..) => vec![TypesOpcode::Push(T::Int)],
        Insn::LongConst(_) => vec![TypesOpcode::Push(T::Long)],
        Insn::FloatConst(_) => vec![TypesOpcode::Push(T::Float)],
        Insn::DoubleConst(_) => vec![TypesOpcode::Push(T::Double)],
        Insn::StringConst(_) => vec![TypesOpcode::Push(T::object(STRING_CLASS))],
        Insn::Var(op, index) => match op {
            Opcode::Iload => vec![TypesOpcode::Get(*index, StackKind::Int)],
            Opcode::Lload => vec![TypesOpcode::Get(*index, StackKind::Long)],
            Opcode::Fload => vec![TypesOpcode::Get(*index, StackKind::Float)],
            Opcode::Dload => vec![TypesOpcode::Get(*index, StackKind::Double)],
            Opcode::Aload => vec![TypesOpcode::Get(*index, StackKind::Object)],
            _ => vec![TypesOpcode::Set(*index)],
        },
        Insn::Iinc { index, .. } => vec![TypesOpcode::Iinc(*index)],
        Insn::Jump(op, _) => pops(jump_pops(*op)).collect(),
        Insn::TableSwitch { .. } => vec![TypesOpcode::Pop],
        Insn::Type(op, class) => match op {
            Opcode::New => vec![TypesOpcode::Push(T::object(class.as_str()))],
            Opcode::Checkcast => unary(T::object(class.as_str())),
            Opcode::InstanceOf => unary(T::Int),
            _ => unary(T::object(array_of(class))),
        },
        Insn::NewArray(kind) => unary(T::object(kind.descriptor())),
        Insn::Field(op, field) => {
            let ty = FieldType::parse(&field.descriptor)
                .map_err(|e| LowerError::Descriptor(e.to_string()))?;
            if *op == Opcode::GetField {
                unary(T::from_field_type(&ty))
            } else {
                pops(2).collect()
            }
        }
        Insn::Invoke(op, method) => {
            let desc = MethodDescriptor::parse(&method.descriptor)
                .map_err(|e| LowerError::Descriptor(e.to_string()))?;
            let receiver = usize::from(*op != Opcode::InvokeStatic);
            let mut ops = Vec::new();
            if let Some(kind) = suspend {
                ops.push(TypesOpcode::Suspend(kind));
            }
            ops.extend(pops(desc.arg_count() + receiver));
            if let Some(ret) = &desc.ret {
                ops.push(TypesOpcode::Push(T::from_field_type(ret)));
            }
            ops
        }
        Insn::Cont(_) => return Err(LowerError::AlreadyInstrumented),
    };
    Ok(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_bytecode::MethodRef;

    #[test]
    fn test_lower_invoke_with_suspension() {
        let insn = Insn::Invoke(
            Opcode::InvokeVirtual,
            MethodRef::new("app/Flow", "call", "(Lrt/Object;)Lrt/Object;"),
        );
        let ops = lower(&insn, Some(SuspendKind::Call)).unwrap();
        assert_eq!(
            ops,
            vec![
                TypesOpcode::Suspend(SuspendKind::Call),
                TypesOpcode::Pop,
                TypesOpcode::Pop,
                TypesOpcode::Push(SlotType::object("rt/Object")),
            ]
        );
    }

    #[test]
    fn test_lower_array_types() {
        let ops = lower(&Insn::Type(Opcode::Anewarray, "app/A".into()), None).unwrap();
        assert_eq!(ops[1], TypesOpcode::Push(SlotType::object("[Lapp/A;")));
        assert_eq!(array_of("[I"), "[[I");
    }

    #[test]
    fn test_cont_rejected() {
        let insn = Insn::Cont(rewind_bytecode::ContInsn::Enter);
        assert_eq!(lower(&insn, None), Err(LowerError::AlreadyInstrumented));
    }
}
