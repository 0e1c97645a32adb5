//! `rewind analyze`: print the suspension points of an entry method.

use super::read_class;
use anyhow::bail;
use rewind_bytecode::ClassFile;
use rewind_engine::instrument::ResumableAdapter;
use rewind_engine::InstrumentConfig;
use std::path::Path;

pub fn execute(config: &dyn InstrumentConfig, input: &Path, full: bool) -> anyhow::Result<()> {
    let class = ClassFile::decode(&read_class(input)?)?;
    let adapter = ResumableAdapter::new(config);
    let Some(types) = adapter.analyze_entry(&class)? else {
        bail!(
            "{} declares no entry method {}{}",
            class.name,
            config.entry_method_name(),
            config.entry_method_descriptor()
        );
    };

    let json = if full {
        serde_json::to_string_pretty(&types)?
    } else {
        serde_json::to_string_pretty(&types.points)?
    };
    println!("{}", json);
    Ok(())
}
