//! Subcommand implementations

pub mod analyze;
pub mod disasm;
pub mod instrument;
pub mod run;

use anyhow::Context;
use rewind_engine::{BasicInstrumentConfig, InstrumentConfig};
use std::path::Path;
use std::sync::Arc;

/// Naming config from `path`, or the defaults
pub fn instrument_config(path: Option<&Path>) -> anyhow::Result<Arc<dyn InstrumentConfig>> {
    let config = match path {
        Some(path) => BasicInstrumentConfig::load(path)
            .with_context(|| format!("loading instrumentation config {}", path.display()))?,
        None => BasicInstrumentConfig::default(),
    };
    Ok(Arc::new(config))
}

/// Read a class file
pub fn read_class(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}
