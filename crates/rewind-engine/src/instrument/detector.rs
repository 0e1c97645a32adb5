//! Eligibility check on raw class bytes
//!
//! Only class headers are read. Super classes and interfaces are fetched from
//! the provider so nothing has to be loaded to decide eligibility.

use super::config::InstrumentConfig;
use crate::error::{ContinuationError, EngineResult};
use crate::loader::ClassBytesProvider;
use rewind_bytecode::{class_flags, ClassHeader, ClassReader};
use rustc_hash::FxHashSet;

/// Decides whether a class implements the configured marker interface
pub struct ContinuableDetector<'a> {
    config: &'a dyn InstrumentConfig,
    provider: &'a dyn ClassBytesProvider,
}

impl<'a> ContinuableDetector<'a> {
    /// Create a detector resolving super types through `provider`
    pub fn new(config: &'a dyn InstrumentConfig, provider: &'a dyn ClassBytesProvider) -> Self {
        Self { config, provider }
    }

    /// Whether the class in `bytes` should be instrumented
    ///
    /// Interfaces and classes that already carry the instrumented flag are
    /// never eligible. A super type whose bytes the provider can't supply is
    /// an error.
    pub fn detect(&self, bytes: &[u8]) -> EngineResult<bool> {
        let header = ClassReader::read_header(bytes)?;
        if header.flags & (class_flags::INTERFACE | class_flags::INSTRUMENTED) != 0 {
            return Ok(false);
        }
        let mut visited = FxHashSet::default();
        visited.insert(header.name.clone());
        self.implements_marker(&header.name, &header, &mut visited)
    }

    fn implements_marker(
        &self,
        root: &str,
        header: &ClassHeader,
        visited: &mut FxHashSet<String>,
    ) -> EngineResult<bool> {
        let marker = self.config.marker_interface();
        if header.interfaces.iter().any(|i| i == marker) {
            return Ok(true);
        }

        let supers = header.super_name.iter().chain(header.interfaces.iter());
        for name in supers {
            if !visited.insert(name.clone()) {
                continue;
            }
            let bytes = self
                .provider
                .class_bytes(name)
                .ok_or_else(|| ContinuationError::UnresolvedHierarchy {
                    class: root.to_string(),
                    missing: name.clone(),
                })?;
            let parent = ClassReader::read_header(&bytes)?;
            if self.implements_marker(root, &parent, visited)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::BasicInstrumentConfig;
    use crate::loader::MemoryClassProvider;
    use rewind_bytecode::ClassBuilder;

    fn provider() -> MemoryClassProvider {
        let provider = MemoryClassProvider::new();
        let mut marker = ClassBuilder::new("rt/Continuable");
        marker.interface();
        provider.insert_class(&marker.build());

        let mut base = ClassBuilder::new("app/Base");
        base.implements("rt/Continuable");
        provider.insert_class(&base.build());

        let mut sub_iface = ClassBuilder::new("app/Flow");
        sub_iface.interface().implements("rt/Continuable");
        provider.insert_class(&sub_iface.build());

        provider.insert_class(&ClassBuilder::new("rt/Object").build());
        provider
    }

    #[test]
    fn test_direct_and_inherited() {
        let provider = provider();
        let config = BasicInstrumentConfig::default();
        let detector = ContinuableDetector::new(&config, &provider);

        let mut direct = ClassBuilder::new("app/A");
        direct.super_class("rt/Object").implements("rt/Continuable");
        assert!(detector.detect(&direct.build().encode()).unwrap());

        let mut inherited = ClassBuilder::new("app/B");
        inherited.super_class("app/Base");
        assert!(detector.detect(&inherited.build().encode()).unwrap());

        let mut via_iface = ClassBuilder::new("app/C");
        via_iface.super_class("rt/Object").implements("app/Flow");
        assert!(detector.detect(&via_iface.build().encode()).unwrap());

        let mut plain = ClassBuilder::new("app/D");
        plain.super_class("rt/Object");
        assert!(!detector.detect(&plain.build().encode()).unwrap());
    }

    #[test]
    fn test_interfaces_are_not_eligible() {
        let provider = provider();
        let config = BasicInstrumentConfig::default();
        let detector = ContinuableDetector::new(&config, &provider);
        let bytes = provider.class_bytes("app/Flow").unwrap();
        assert!(!detector.detect(&bytes).unwrap());
    }

    #[test]
    fn test_missing_super_is_an_error() {
        let provider = provider();
        let config = BasicInstrumentConfig::default();
        let detector = ContinuableDetector::new(&config, &provider);

        let mut orphan = ClassBuilder::new("app/Orphan");
        orphan.super_class("app/Gone");
        let err = detector.detect(&orphan.build().encode()).unwrap_err();
        match err {
            ContinuationError::UnresolvedHierarchy { class, missing } => {
                assert_eq!(class, "app/Orphan");
                assert_eq!(missing, "app/Gone");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
