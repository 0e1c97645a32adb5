//! `rewind instrument`: rewrite a continuable class file offline.

use super::read_class;
use anyhow::Context;
use rewind_engine::{ContinuationsTransformer, DirectoryClassProvider, InstrumentConfig};
use std::path::Path;
use std::sync::Arc;

pub fn execute(
    config: Arc<dyn InstrumentConfig>,
    classpath: &Path,
    input: &Path,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let bytes = read_class(input)?;
    let provider = DirectoryClassProvider::new(classpath);
    let transformer = ContinuationsTransformer::new(config);

    let Some(transformed) = transformer
        .transform(&provider, &bytes)
        .with_context(|| format!("instrumenting {}", input.display()))?
    else {
        println!("{}: not continuable or already instrumented, left unchanged", input.display());
        return Ok(());
    };

    let target = output.unwrap_or(input);
    std::fs::write(target, &transformed).with_context(|| format!("writing {}", target.display()))?;
    println!(
        "{}: instrumented ({} -> {} bytes)",
        target.display(),
        bytes.len(),
        transformed.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_bytecode::{class_flags, ClassBuilder, ClassFile, Opcode};
    use rewind_engine::BasicInstrumentConfig;

    fn continuable() -> ClassFile {
        let mut class = ClassBuilder::new("app/Job");
        class.super_class("rt/Object").implements("rt/Continuable");
        let mut m = class.method("execute", "()V");
        m.op(Opcode::Return);
        class.add_method(m).unwrap();
        class.build()
    }

    #[test]
    fn test_instrument_writes_flagged_class() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Job.rwc");
        let output = dir.path().join("Job.out.rwc");
        std::fs::write(&input, continuable().encode()).unwrap();

        execute(
            Arc::new(BasicInstrumentConfig::default()),
            dir.path(),
            &input,
            Some(&output),
        )
        .unwrap();

        let class = ClassFile::decode(&std::fs::read(&output).unwrap()).unwrap();
        assert_ne!(class.flags & class_flags::INSTRUMENTED, 0);
        assert_eq!(class.name, "app/Job");
    }

    #[test]
    fn test_plain_class_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("Plain.rwc");
        let mut plain = ClassBuilder::new("app/Plain");
        plain.super_class("rt/Object");
        let bytes = plain.build().encode();
        std::fs::write(&input, &bytes).unwrap();

        // rt/Object is not on the classpath, so the hierarchy can't be walked.
        let result = execute(
            Arc::new(BasicInstrumentConfig::default()),
            dir.path(),
            &input,
            None,
        );
        assert!(result.is_err());
        assert_eq!(std::fs::read(&input).unwrap(), bytes);
    }
}
