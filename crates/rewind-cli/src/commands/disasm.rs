//! `rewind disasm`: print a class file.

use super::read_class;
use rewind_bytecode::{class_flags, ClassFile, Insn};
use std::fmt::Write;
use std::path::Path;

pub fn execute(input: &Path) -> anyhow::Result<()> {
    let class = ClassFile::decode(&read_class(input)?)?;
    print!("{}", render(&class)?);
    Ok(())
}

fn class_flag_names(flags: u32) -> Vec<&'static str> {
    [
        (class_flags::PUBLIC, "public"),
        (class_flags::INTERFACE, "interface"),
        (class_flags::ABSTRACT, "abstract"),
        (class_flags::CLONEABLE, "cloneable"),
        (class_flags::INSTRUMENTED, "instrumented"),
    ]
    .into_iter()
    .filter(|(bit, _)| flags & bit != 0)
    .map(|(_, name)| name)
    .collect()
}

/// Text listing of a class
pub fn render(class: &ClassFile) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "class {} [{}]", class.name, class_flag_names(class.flags).join(" "))?;
    if let Some(super_name) = &class.super_name {
        writeln!(out, "  extends {}", super_name)?;
    }
    for interface in &class.interfaces {
        writeln!(out, "  implements {}", interface)?;
    }
    for field in &class.fields {
        writeln!(out, "  field {} {}", field.name, field.descriptor)?;
    }

    for method in &class.methods {
        writeln!(out)?;
        let mut modifiers = Vec::new();
        if method.is_static() {
            modifiers.push("static");
        }
        if method.is_native() {
            modifiers.push("native");
        }
        if method.is_abstract() {
            modifiers.push("abstract");
        }
        writeln!(
            out,
            "  method {}{} {}(locals {})",
            method.name,
            method.descriptor,
            modifiers.iter().map(|m| format!("{} ", m)).collect::<String>(),
            method.max_locals
        )?;
        if method.code.is_empty() {
            continue;
        }

        let body = method.body(&class.constants)?;
        for (index, insn) in body.insns.iter().enumerate() {
            match insn {
                Insn::Label(label) => writeln!(out, "   L{}:", label.0)?,
                other => writeln!(out, "    {:4}  {:?}", index, other)?,
            }
        }
        for handler in &body.handlers {
            writeln!(
                out,
                "    handler L{}..L{} -> L{} {}",
                handler.start.0,
                handler.end.0,
                handler.handler.0,
                handler.catch_type.as_deref().unwrap_or("any")
            )?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_bytecode::{ClassBuilder, Opcode};

    #[test]
    fn test_render_lists_methods() {
        let mut class = ClassBuilder::new("app/Hello");
        class.super_class("rt/Object").field("count", "I");
        let mut m = class.method("run", "()I");
        m.iconst(42).op(Opcode::Ireturn);
        class.add_method(m).unwrap();

        let text = render(&class.build()).unwrap();
        assert!(text.starts_with("class app/Hello [public]"));
        assert!(text.contains("extends rt/Object"));
        assert!(text.contains("field count I"));
        assert!(text.contains("method run()I"));
        assert!(text.contains("Ireturn"));
    }
}
