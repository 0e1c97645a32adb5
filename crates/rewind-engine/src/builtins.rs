//! Built-in runtime classes
//!
//! These are always visible to the class loader, ahead of any provider:
//! the root object, strings, the exception hierarchy the VM throws, the
//! marker interface, the support class declaring the suspension methods and
//! a static string helper library. Method bodies are native, see
//! [`crate::natives`].

use crate::types::{OBJECT_CLASS, STRING_CLASS, THROWABLE_CLASS};
use once_cell::sync::Lazy;
use rewind_bytecode::{class_flags, method_flags, ClassFile, FieldDef, MethodDef, MethodDescriptor};
use rustc_hash::FxHashMap;

/// Base class of checked failures
pub const EXCEPTION_CLASS: &str = "rt/Exception";

/// Integer division by zero
pub const ARITHMETIC_EXCEPTION: &str = "rt/ArithmeticException";

/// Null receiver, field access or throw
pub const NULL_POINTER_EXCEPTION: &str = "rt/NullPointerException";

/// Array index out of range or negative size
pub const INDEX_EXCEPTION: &str = "rt/IndexOutOfBoundsException";

/// Failed `Checkcast`
pub const CLASS_CAST_EXCEPTION: &str = "rt/ClassCastException";

/// Default marker interface
pub const CONTINUABLE_INTERFACE: &str = "rt/Continuable";

/// Default support class declaring pause, stepBack, call and answer
pub const CONTINUABLE_OBJECT_CLASS: &str = "rt/ContinuableObject";

/// Static string helpers
pub const STRINGS_CLASS: &str = "rt/Strings";

fn native(class: &mut ClassFile, name: &str, descriptor: &str, is_static: bool) {
    let args = MethodDescriptor::parse(descriptor).map_or(0, |d| d.arg_count());
    let mut flags = method_flags::PUBLIC | method_flags::NATIVE;
    if is_static {
        flags |= method_flags::STATIC;
    }
    class.methods.push(MethodDef {
        flags,
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        max_locals: (args + usize::from(!is_static)) as u16,
        code: Vec::new(),
        handlers: Vec::new(),
    });
}

fn class(name: &str, super_name: Option<&str>) -> ClassFile {
    ClassFile::new(name, super_name.map(str::to_string))
}

fn build_all() -> Vec<ClassFile> {
    let mut object = class(OBJECT_CLASS, None);
    native(&mut object, "toString", "()Lrt/String;", false);

    let mut string = class(STRING_CLASS, Some(OBJECT_CLASS));
    native(&mut string, "length", "()I", false);
    native(&mut string, "concat", "(Lrt/String;)Lrt/String;", false);
    native(&mut string, "equals", "(Lrt/Object;)Z", false);

    let mut throwable = class(THROWABLE_CLASS, Some(OBJECT_CLASS));
    throwable.fields.push(FieldDef {
        flags: 0,
        name: "message".to_string(),
        descriptor: "Lrt/String;".to_string(),
    });
    native(&mut throwable, "getMessage", "()Lrt/String;", false);

    let exception = class(EXCEPTION_CLASS, Some(THROWABLE_CLASS));
    let runtime_errors = [
        ARITHMETIC_EXCEPTION,
        NULL_POINTER_EXCEPTION,
        INDEX_EXCEPTION,
        CLASS_CAST_EXCEPTION,
    ]
    .map(|name| class(name, Some(EXCEPTION_CLASS)));

    let mut continuable = class(CONTINUABLE_INTERFACE, None);
    continuable.flags |= class_flags::INTERFACE | class_flags::ABSTRACT;

    let mut support = class(CONTINUABLE_OBJECT_CLASS, Some(OBJECT_CLASS));
    support.flags |= class_flags::CLONEABLE;
    support.interfaces.push(CONTINUABLE_INTERFACE.to_string());
    native(&mut support, "pause", "()V", false);
    native(&mut support, "stepBack", "()V", false);
    native(&mut support, "call", "(Lrt/Object;)Lrt/Object;", false);
    native(&mut support, "answer", "()V", false);
    native(&mut support, "answer", "(Lrt/Object;)V", false);

    let mut strings = class(STRINGS_CLASS, Some(OBJECT_CLASS));
    native(&mut strings, "concat", "(Lrt/String;Lrt/String;)Lrt/String;", true);
    native(&mut strings, "ofInt", "(I)Lrt/String;", true);
    native(&mut strings, "ofLong", "(J)Lrt/String;", true);
    native(&mut strings, "ofDouble", "(D)Lrt/String;", true);
    native(&mut strings, "ofBoolean", "(Z)Lrt/String;", true);
    native(&mut strings, "of", "(Lrt/Object;)Lrt/String;", true);
    native(&mut strings, "length", "(Lrt/String;)I", true);
    native(&mut strings, "equals", "(Lrt/Object;Lrt/Object;)Z", true);

    let mut all = vec![object, string, throwable, exception, continuable, support, strings];
    all.extend(runtime_errors);
    all
}

static BUILTIN_CLASSES: Lazy<FxHashMap<String, Vec<u8>>> = Lazy::new(|| {
    build_all()
        .into_iter()
        .map(|class| (class.name.clone(), class.encode()))
        .collect()
});

/// Encoded bytes of a built-in class
pub fn builtin_bytes(name: &str) -> Option<Vec<u8>> {
    BUILTIN_CLASSES.get(name).cloned()
}

/// Names of all built-in classes
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_CLASSES.keys().map(String::as_str)
}
