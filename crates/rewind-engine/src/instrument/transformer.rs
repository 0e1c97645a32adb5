//! Load-time transformation entry point

use super::adapter::ResumableAdapter;
use super::config::InstrumentConfig;
use super::detector::ContinuableDetector;
use crate::error::EngineResult;
use crate::loader::ClassBytesProvider;
use rewind_bytecode::{verify_class, ClassFile};
use std::sync::Arc;

/// Turns the bytes of continuable classes into their resumable form
#[derive(Clone)]
pub struct ContinuationsTransformer {
    config: Arc<dyn InstrumentConfig>,
}

impl ContinuationsTransformer {
    /// Create a transformer for the given naming contract
    pub fn new(config: Arc<dyn InstrumentConfig>) -> Self {
        Self { config }
    }

    /// The naming contract in use
    pub fn config(&self) -> &dyn InstrumentConfig {
        self.config.as_ref()
    }

    /// Transform one class
    ///
    /// Returns `None` when the class is left untouched: it isn't continuable,
    /// it was instrumented already, or it declares no entry method.
    pub fn transform(
        &self,
        provider: &dyn ClassBytesProvider,
        bytes: &[u8],
    ) -> EngineResult<Option<Vec<u8>>> {
        let detector = ContinuableDetector::new(self.config.as_ref(), provider);
        if !detector.detect(bytes)? {
            return Ok(None);
        }

        let mut class = ClassFile::decode(bytes)?;
        let adapter = ResumableAdapter::new(self.config.as_ref());
        if !adapter.adapt_class(&mut class)? {
            return Ok(None);
        }
        verify_class(&class)?;
        tracing::debug!(class = %class.name, "instrument: class transformed");
        Ok(Some(class.encode()))
    }
}
