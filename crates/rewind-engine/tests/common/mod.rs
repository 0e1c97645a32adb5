//! Shared fixtures: small continuable classes assembled in code

#![allow(dead_code)]

use rewind_bytecode::{ClassBuilder, ClassFile, Opcode};
use rewind_engine::builtins::CONTINUABLE_OBJECT_CLASS;
use rewind_engine::{BasicContinuableRunner, BasicInstrumentConfig, MemoryClassProvider, RuntimeSettings};
use std::sync::Arc;

pub fn runner(classes: &[ClassFile], settings: RuntimeSettings) -> BasicContinuableRunner {
    let provider = MemoryClassProvider::new();
    for class in classes {
        provider.insert_class(class);
    }
    BasicContinuableRunner::new(
        Arc::new(provider),
        Arc::new(BasicInstrumentConfig::default()),
        settings,
    )
}

fn pause(m: &mut rewind_bytecode::MethodBuilder) {
    m.aload(0)
        .invoke_virtual(CONTINUABLE_OBJECT_CLASS, "pause", "()V");
}

/// Counts local 1 down from 5, bumping `ticks` and pausing while it is
/// positive, then decrements once more and pauses at -1
pub fn countdown() -> ClassFile {
    let mut class = ClassBuilder::new("app/Countdown");
    class.super_class(CONTINUABLE_OBJECT_CLASS).field("ticks", "I");

    let mut m = class.method("execute", "()V");
    let top = m.new_label();
    let done = m.new_label();
    m.max_locals(2).iconst(5).istore(1).place(top).iload(1).jump(Opcode::Ifle, done);
    m.aload(0)
        .aload(0)
        .get_this_field("ticks", "I")
        .iconst(1)
        .op(Opcode::Iadd)
        .put_this_field("ticks", "I");
    pause(&mut m);
    m.iinc(1, -1).goto(top).place(done).iinc(1, -1);
    pause(&mut m);
    m.op(Opcode::Return);
    class.add_method(m).unwrap();
    class.build()
}

/// Pauses with local 1 at 1 and 2, then steps back when it reaches 3
pub fn stepper() -> ClassFile {
    let mut class = ClassBuilder::new("app/Stepper");
    class.super_class(CONTINUABLE_OBJECT_CLASS);

    let mut m = class.method("execute", "()V");
    let top = m.new_label();
    let back = m.new_label();
    m.max_locals(2)
        .iconst(0)
        .istore(1)
        .place(top)
        .iinc(1, 1)
        .iload(1)
        .iconst(3)
        .jump(Opcode::IfIcmpeq, back);
    pause(&mut m);
    m.goto(top).place(back).aload(0).invoke_virtual(
        CONTINUABLE_OBJECT_CLASS,
        "stepBack",
        "()V",
    );
    m.op(Opcode::Return);
    class.add_method(m).unwrap();
    class.build()
}

/// Calls `target` (a class name, or null when `target` is `None`), stores the
/// answer in local 1 and pauses
pub fn caller(name: &str, target: Option<&str>) -> ClassFile {
    call_and_store(name, target, true)
}

/// Calls `target`, stores the answer in local 1 and returns
pub fn finisher(name: &str, target: &str) -> ClassFile {
    call_and_store(name, Some(target), false)
}

fn call_and_store(name: &str, target: Option<&str>, pause_after: bool) -> ClassFile {
    let mut class = ClassBuilder::new(name);
    class.super_class(CONTINUABLE_OBJECT_CLASS);

    let mut m = class.method("execute", "()V");
    m.max_locals(2).aload(0);
    match target {
        Some(target) => m.ldc(target),
        None => m.op(Opcode::AconstNull),
    };
    m.invoke_virtual(CONTINUABLE_OBJECT_CLASS, "call", "(Lrt/Object;)Lrt/Object;")
        .astore(1);
    if pause_after {
        pause(&mut m);
    }
    m.op(Opcode::Return);
    class.add_method(m).unwrap();
    class.build()
}

/// Pauses `pauses` times, then answers `reply` to its caller
pub fn callee(name: &str, pauses: usize, reply: &str) -> ClassFile {
    let mut class = ClassBuilder::new(name);
    class.super_class(CONTINUABLE_OBJECT_CLASS);

    let mut m = class.method("execute", "()V");
    for _ in 0..pauses {
        pause(&mut m);
    }
    m.aload(0)
        .ldc(reply)
        .invoke_virtual(CONTINUABLE_OBJECT_CLASS, "answer", "(Lrt/Object;)V")
        .op(Opcode::Return);
    class.add_method(m).unwrap();
    class.build()
}

/// Divides by zero before pausing
pub fn faulty() -> ClassFile {
    let mut class = ClassBuilder::new("app/Faulty");
    class.super_class(CONTINUABLE_OBJECT_CLASS);

    let mut m = class.method("execute", "()V");
    m.max_locals(2)
        .iconst(1)
        .iconst(0)
        .op(Opcode::Idiv)
        .istore(1);
    pause(&mut m);
    m.op(Opcode::Return);
    class.add_method(m).unwrap();
    class.build()
}

/// Finishes without answering
pub fn silent(name: &str) -> ClassFile {
    let mut class = ClassBuilder::new(name);
    class.super_class(CONTINUABLE_OBJECT_CLASS);
    let mut m = class.method("execute", "()V");
    m.op(Opcode::Return);
    class.add_method(m).unwrap();
    class.build()
}
