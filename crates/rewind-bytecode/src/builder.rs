//! Assembler API for building class files in code
//!
//! ```
//! use rewind_bytecode::{ClassBuilder, Opcode};
//!
//! let mut class = ClassBuilder::new("app/Hello");
//! class.super_class("rt/Object").field("count", "I");
//!
//! let mut m = class.method("run", "()I");
//! m.max_locals(1).iconst(42).op(Opcode::Ireturn);
//! class.add_method(m).unwrap();
//!
//! let bytes = class.build().encode();
//! assert_eq!(&bytes[..4], b"RWND");
//! ```

use crate::class::{class_flags, method_flags, ClassError, ClassFile, FieldDef, MethodDef};
use crate::code::{CodeBody, HandlerBlock};
use crate::constants::{FieldRef, MethodRef};
use crate::insn::{ArrayKind, Insn, Label};
use crate::opcode::Opcode;

/// Builds a [`ClassFile`]
#[derive(Debug)]
pub struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    /// Start a class with the given internal name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            class: ClassFile::new(name, None),
        }
    }

    /// Name of the class being built
    pub fn name(&self) -> &str {
        &self.class.name
    }

    /// Set the super class
    pub fn super_class(&mut self, name: impl Into<String>) -> &mut Self {
        self.class.super_name = Some(name.into());
        self
    }

    /// Add an implemented interface
    pub fn implements(&mut self, name: impl Into<String>) -> &mut Self {
        self.class.interfaces.push(name.into());
        self
    }

    /// Mark instances as deep-cloneable
    pub fn cloneable(&mut self) -> &mut Self {
        self.class.flags |= class_flags::CLONEABLE;
        self
    }

    /// Mark the class as an interface
    pub fn interface(&mut self) -> &mut Self {
        self.class.flags |= class_flags::INTERFACE | class_flags::ABSTRACT;
        self
    }

    /// Declare an instance field
    pub fn field(&mut self, name: impl Into<String>, descriptor: impl Into<String>) -> &mut Self {
        self.class.fields.push(FieldDef {
            flags: 0,
            name: name.into(),
            descriptor: descriptor.into(),
        });
        self
    }

    /// Start a method of this class
    pub fn method(&self, name: impl Into<String>, descriptor: impl Into<String>) -> MethodBuilder {
        MethodBuilder::new(&self.class.name, name, descriptor)
    }

    /// Encode a finished method into the class
    pub fn add_method(&mut self, method: MethodBuilder) -> Result<&mut Self, ClassError> {
        let def = method.finish(&mut self.class)?;
        self.class.methods.push(def);
        Ok(self)
    }

    /// Finish the class
    pub fn build(self) -> ClassFile {
        self.class
    }
}

/// Builds one method body
#[derive(Debug)]
pub struct MethodBuilder {
    owner: String,
    name: String,
    descriptor: String,
    flags: u16,
    max_locals: u16,
    body: CodeBody,
}

impl MethodBuilder {
    /// Start a method; `owner` is used by the `this_*` helpers
    pub fn new(owner: impl Into<String>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
            flags: method_flags::PUBLIC,
            max_locals: 1,
            body: CodeBody::new(),
        }
    }

    /// Set the number of local slots
    pub fn max_locals(&mut self, count: u16) -> &mut Self {
        self.max_locals = count;
        self
    }

    /// Mark as static
    pub fn static_method(&mut self) -> &mut Self {
        self.flags |= method_flags::STATIC;
        self
    }

    /// Mark as native (no body)
    pub fn native(&mut self) -> &mut Self {
        self.flags |= method_flags::NATIVE;
        self
    }

    /// Mark as abstract (no body)
    pub fn abstract_method(&mut self) -> &mut Self {
        self.flags |= method_flags::ABSTRACT;
        self
    }

    /// Allocate a label
    pub fn new_label(&mut self) -> Label {
        self.body.new_label()
    }

    /// Place a label at the current position
    pub fn place(&mut self, label: Label) -> &mut Self {
        self.insn(Insn::Label(label))
    }

    /// Append an arbitrary instruction
    pub fn insn(&mut self, insn: Insn) -> &mut Self {
        self.body.insns.push(insn);
        self
    }

    /// Append an operand-less opcode
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.insn(Insn::Simple(opcode))
    }

    /// Push an int constant
    pub fn iconst(&mut self, value: i32) -> &mut Self {
        self.insn(Insn::IntConst(Opcode::Iconst, value))
    }

    /// Push a long constant
    pub fn lconst(&mut self, value: i64) -> &mut Self {
        self.insn(Insn::LongConst(value))
    }

    /// Push a float constant
    pub fn fconst(&mut self, value: f32) -> &mut Self {
        self.insn(Insn::FloatConst(value))
    }

    /// Push a double constant
    pub fn dconst(&mut self, value: f64) -> &mut Self {
        self.insn(Insn::DoubleConst(value))
    }

    /// Push a string constant
    pub fn ldc(&mut self, value: impl Into<String>) -> &mut Self {
        self.insn(Insn::StringConst(value.into()))
    }

    /// Typed local load or store
    pub fn var(&mut self, opcode: Opcode, index: u16) -> &mut Self {
        self.insn(Insn::Var(opcode, index))
    }

    /// `iload`
    pub fn iload(&mut self, index: u16) -> &mut Self {
        self.var(Opcode::Iload, index)
    }

    /// `istore`
    pub fn istore(&mut self, index: u16) -> &mut Self {
        self.var(Opcode::Istore, index)
    }

    /// `aload`
    pub fn aload(&mut self, index: u16) -> &mut Self {
        self.var(Opcode::Aload, index)
    }

    /// `astore`
    pub fn astore(&mut self, index: u16) -> &mut Self {
        self.var(Opcode::Astore, index)
    }

    /// `iinc`
    pub fn iinc(&mut self, index: u16, delta: i16) -> &mut Self {
        self.insn(Insn::Iinc { index, delta })
    }

    /// Conditional or unconditional jump
    pub fn jump(&mut self, opcode: Opcode, target: Label) -> &mut Self {
        self.insn(Insn::Jump(opcode, target))
    }

    /// `goto`
    pub fn goto(&mut self, target: Label) -> &mut Self {
        self.jump(Opcode::Goto, target)
    }

    /// `tableswitch`
    pub fn table_switch(&mut self, low: i32, default: Label, targets: Vec<Label>) -> &mut Self {
        self.insn(Insn::TableSwitch {
            low,
            default,
            targets,
        })
    }

    /// `new`, `checkcast`, `instanceof` or `anewarray`
    pub fn type_insn(&mut self, opcode: Opcode, class: impl Into<String>) -> &mut Self {
        self.insn(Insn::Type(opcode, class.into()))
    }

    /// `newarray`
    pub fn new_array(&mut self, kind: ArrayKind) -> &mut Self {
        self.insn(Insn::NewArray(kind))
    }

    /// `getfield`
    pub fn get_field(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.insn(Insn::Field(Opcode::GetField, FieldRef::new(owner, name, descriptor)))
    }

    /// `putfield`
    pub fn put_field(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.insn(Insn::Field(Opcode::PutField, FieldRef::new(owner, name, descriptor)))
    }

    /// `getfield` on a field of the class being built
    pub fn get_this_field(&mut self, name: &str, descriptor: &str) -> &mut Self {
        let owner = self.owner.clone();
        self.get_field(&owner, name, descriptor)
    }

    /// `putfield` on a field of the class being built
    pub fn put_this_field(&mut self, name: &str, descriptor: &str) -> &mut Self {
        let owner = self.owner.clone();
        self.put_field(&owner, name, descriptor)
    }

    /// Method invocation
    pub fn invoke(&mut self, opcode: Opcode, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.insn(Insn::Invoke(opcode, MethodRef::new(owner, name, descriptor)))
    }

    /// `invokevirtual`
    pub fn invoke_virtual(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(Opcode::InvokeVirtual, owner, name, descriptor)
    }

    /// `invokestatic`
    pub fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(Opcode::InvokeStatic, owner, name, descriptor)
    }

    /// `invokespecial`
    pub fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.invoke(Opcode::InvokeSpecial, owner, name, descriptor)
    }

    /// Add an exception handler
    pub fn handler(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) -> &mut Self {
        self.body.handlers.push(HandlerBlock {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_string),
        });
        self
    }

    /// The body assembled so far
    pub fn body(&self) -> &CodeBody {
        &self.body
    }

    fn finish(self, class: &mut ClassFile) -> Result<MethodDef, ClassError> {
        let mut def = MethodDef {
            flags: self.flags,
            name: self.name,
            descriptor: self.descriptor,
            max_locals: self.max_locals,
            code: Vec::new(),
            handlers: Vec::new(),
        };
        if !def.is_native() && !def.is_abstract() {
            def.set_body(&self.body, &mut class.constants)?;
        }
        Ok(def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_decode() {
        let mut class = ClassBuilder::new("app/Loop");
        class.super_class("rt/Object").field("total", "J");

        let mut m = class.method("run", "()V");
        let head = m.new_label();
        let done = m.new_label();
        m.max_locals(2)
            .iconst(3)
            .istore(1)
            .place(head)
            .iload(1)
            .jump(Opcode::Ifle, done)
            .iinc(1, -1)
            .goto(head)
            .place(done)
            .op(Opcode::Return);
        let expected = m.body().insns.clone();
        class.add_method(m).unwrap();

        let mut native = class.method("now", "()J");
        native.native();
        class.add_method(native).unwrap();

        let file = ClassFile::decode(&class.build().encode()).unwrap();
        let run = file.find_method("run", "()V").unwrap();
        assert_eq!(run.body(&file.constants).unwrap().insns, expected);
        assert!(file.find_method("now", "()J").unwrap().code.is_empty());
    }

    #[test]
    fn test_unplaced_label_fails() {
        let mut class = ClassBuilder::new("app/Broken");
        let mut m = class.method("run", "()V");
        let nowhere = m.new_label();
        m.goto(nowhere);
        assert!(matches!(class.add_method(m), Err(ClassError::Code { .. })));
    }
}
