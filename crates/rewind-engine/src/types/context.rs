//! Abstract frame: local variable and operand stack types at one point

use super::lattice::SlotType;
use super::opcode::TypesOpcode;
use rewind_bytecode::MethodDescriptor;
use serde::Serialize;

/// Types of every local and operand at one program point
///
/// A local is `None` until a write reaches it on every incoming path.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TypesContext {
    /// One entry per local index
    pub locals: Vec<Option<SlotType>>,
    /// Operand stack, bottom first
    pub stack: Vec<SlotType>,
}

impl TypesContext {
    /// Frame on method entry: receiver and declared parameters
    pub fn entry(owner: &str, is_static: bool, desc: &MethodDescriptor, max_locals: u16) -> Self {
        let mut locals = vec![None; max_locals as usize];
        let mut index = 0;
        if !is_static {
            if let Some(slot) = locals.get_mut(0) {
                *slot = Some(SlotType::object(owner));
            }
            index = 1;
        }
        for param in &desc.params {
            if let Some(slot) = locals.get_mut(index) {
                *slot = Some(SlotType::from_field_type(param));
            }
            index += 1;
        }
        Self {
            locals,
            stack: Vec::new(),
        }
    }

    /// Frame at an exception handler: the given locals, one caught value
    pub fn exception(locals: Vec<Option<SlotType>>, caught: SlotType) -> Self {
        Self {
            locals,
            stack: vec![caught],
        }
    }

    /// Written locals with their types, lowest index first
    pub fn live_locals(&self) -> Vec<(u16, SlotType)> {
        self.locals
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.clone().map(|t| (i as u16, t)))
            .collect()
    }

    /// Merge with the frame arriving over another edge
    pub fn merge(&self, other: &TypesContext) -> Result<TypesContext, String> {
        if self.stack.len() != other.stack.len() {
            return Err(format!(
                "stack height mismatch at join: {} vs {}",
                self.stack.len(),
                other.stack.len()
            ));
        }
        let len = self.locals.len().max(other.locals.len());
        let locals = (0..len)
            .map(|i| {
                match (
                    self.locals.get(i).cloned().flatten(),
                    other.locals.get(i).cloned().flatten(),
                ) {
                    // A local holding different categories on two paths is dead.
                    (Some(a), Some(b)) if a.stack_kind() == b.stack_kind() => Some(a.merge(&b)),
                    _ => None,
                }
            })
            .collect();
        let mut stack = Vec::with_capacity(self.stack.len());
        for (a, b) in self.stack.iter().zip(&other.stack) {
            if a.stack_kind() != b.stack_kind() {
                return Err(format!("operand type mismatch at join: {} vs {}", a, b));
            }
            stack.push(a.merge(b));
        }
        Ok(TypesContext { locals, stack })
    }

    fn pop(&mut self) -> Result<SlotType, String> {
        self.stack
            .pop()
            .ok_or_else(|| "operand stack underflow".to_string())
    }

    fn peek(&self, depth: usize) -> Result<&SlotType, String> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| self.stack.get(i))
            .ok_or_else(|| "operand stack underflow".to_string())
    }

    fn set_local(&mut self, index: u16, ty: SlotType) {
        let index = index as usize;
        if index >= self.locals.len() {
            self.locals.resize(index + 1, None);
        }
        self.locals[index] = Some(ty);
    }

    /// Apply one abstract operation
    pub fn apply(&mut self, op: &TypesOpcode) -> Result<(), String> {
        match op {
            TypesOpcode::Push(ty) => self.stack.push(ty.clone()),
            TypesOpcode::Pop => {
                self.pop()?;
            }
            TypesOpcode::Pop2 => {
                if !self.pop()?.is_wide() {
                    self.pop()?;
                }
            }
            TypesOpcode::Dup => {
                let top = self.peek(0)?.clone();
                self.stack.push(top);
            }
            TypesOpcode::DupX1 => {
                let a = self.pop()?;
                let b = self.pop()?;
                self.stack.extend([a.clone(), b, a]);
            }
            TypesOpcode::DupX2 => {
                let a = self.pop()?;
                let b = self.pop()?;
                if b.is_wide() {
                    self.stack.extend([a.clone(), b, a]);
                } else {
                    let c = self.pop()?;
                    self.stack.extend([a.clone(), c, b, a]);
                }
            }
            TypesOpcode::Dup2 => {
                let a = self.peek(0)?.clone();
                if a.is_wide() {
                    self.stack.push(a);
                } else {
                    let b = self.peek(1)?.clone();
                    self.stack.extend([b, a]);
                }
            }
            TypesOpcode::Swap => {
                let a = self.pop()?;
                let b = self.pop()?;
                self.stack.extend([a, b]);
            }
            TypesOpcode::Set(index) => {
                let ty = self.pop()?;
                self.set_local(*index, ty);
            }
            TypesOpcode::Get(index, kind) => {
                let ty = self
                    .locals
                    .get(*index as usize)
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| SlotType::from_kind(*kind));
                self.stack.push(ty);
            }
            TypesOpcode::Iinc(index) => self.set_local(*index, SlotType::Int),
            TypesOpcode::ArrayElement => {
                self.pop()?;
                let array = self.pop()?;
                let element = array
                    .array_element()
                    .unwrap_or_else(|| SlotType::from_kind(rewind_bytecode::StackKind::Object));
                self.stack.push(element);
            }
            TypesOpcode::Suspend(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_frame() {
        let desc = MethodDescriptor::parse("(IJLapp/B;)V").unwrap();
        let ctx = TypesContext::entry("app/A", false, &desc, 6);
        assert_eq!(ctx.locals[0], Some(SlotType::object("app/A")));
        assert_eq!(ctx.locals[1], Some(SlotType::Int));
        assert_eq!(ctx.locals[2], Some(SlotType::Long));
        assert_eq!(ctx.locals[3], Some(SlotType::object("app/B")));
        assert_eq!(ctx.locals[4], None);
        assert_eq!(ctx.live_locals().len(), 4);
    }

    #[test]
    fn test_wide_stack_ops() {
        let mut ctx = TypesContext::default();
        ctx.apply(&TypesOpcode::Push(SlotType::Long)).unwrap();
        ctx.apply(&TypesOpcode::Dup2).unwrap();
        assert_eq!(ctx.stack.len(), 2);
        ctx.apply(&TypesOpcode::Pop2).unwrap();
        ctx.apply(&TypesOpcode::Push(SlotType::Int)).unwrap();
        ctx.apply(&TypesOpcode::Push(SlotType::Float)).unwrap();
        ctx.apply(&TypesOpcode::Dup2).unwrap();
        assert_eq!(
            ctx.stack,
            vec![
                SlotType::Long,
                SlotType::Int,
                SlotType::Float,
                SlotType::Int,
                SlotType::Float
            ]
        );
        ctx.apply(&TypesOpcode::Pop2).unwrap();
        assert_eq!(ctx.stack.len(), 3);
    }

    #[test]
    fn test_merge_drops_partial_locals() {
        let mut a = TypesContext::default();
        let mut b = TypesContext::default();
        a.set_local(1, SlotType::Int);
        b.set_local(1, SlotType::Byte);
        a.set_local(2, SlotType::Int);
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.locals[1], Some(SlotType::Int));
        assert_eq!(merged.locals[2], None);

        let mut c = TypesContext::default();
        c.set_local(1, SlotType::Double);
        assert_eq!(a.merge(&c).unwrap().locals[1], None);

        b.stack.push(SlotType::Int);
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn test_underflow() {
        let mut ctx = TypesContext::default();
        assert!(ctx.apply(&TypesOpcode::Pop).is_err());
    }
}
