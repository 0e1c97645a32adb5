//! Runtime policy
//!
//! The engine asks a [`RuntimeConfig`] how long contexts live, how often to
//! purge, which manager owns an executing continuable and whether resuming
//! clones. The config travels inside the [`ExecutionScope`] instead of a
//! thread-local.
//!
//! [`ExecutionScope`]: crate::scope::ExecutionScope

use crate::defaults::{
    DEFAULT_CONTINUATION_DURATION_MS, DEFAULT_CONTINUATION_PURGE_FREQUENCY,
    DEFAULT_CONTINUATION_PURGE_SCALE,
};
use crate::error::{ContinuationError, EngineResult};
use crate::manager::ContinuationManager;
use crate::value::ObjectRef;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Policy consulted by contexts and the manager
pub trait RuntimeConfig: Send + Sync {
    /// How long a context stays resumable after its last start
    fn continuation_duration(&self) -> Duration {
        Duration::from_millis(DEFAULT_CONTINUATION_DURATION_MS)
    }

    /// Purge chance numerator, see [`purge_scale`](Self::purge_scale)
    fn purge_frequency(&self) -> u32 {
        DEFAULT_CONTINUATION_PURGE_FREQUENCY
    }

    /// Purge chance denominator; zero turns purging off
    fn purge_scale(&self) -> u32 {
        DEFAULT_CONTINUATION_PURGE_SCALE
    }

    /// Manager that registers contexts of `executing`
    fn continuation_manager(&self, executing: &ObjectRef) -> Option<Arc<ContinuationManager>>;

    /// Whether resuming a context of `continuable` clones it
    fn clone_continuations(&self, continuable: &ObjectRef) -> bool;
}

/// Duration and purge tuning as read from TOML
///
/// ```toml
/// duration_ms = 60000
/// purge_frequency = 20
/// purge_scale = 1000
/// clone_continuations = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Context lifetime in milliseconds
    pub duration_ms: u64,
    /// Purge chance numerator
    pub purge_frequency: u32,
    /// Purge chance denominator
    pub purge_scale: u32,
    /// Clone on resume
    pub clone_continuations: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            duration_ms: DEFAULT_CONTINUATION_DURATION_MS,
            purge_frequency: DEFAULT_CONTINUATION_PURGE_FREQUENCY,
            purge_scale: DEFAULT_CONTINUATION_PURGE_SCALE,
            clone_continuations: true,
        }
    }
}

impl RuntimeSettings {
    /// Parse from TOML text; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        toml::from_str(text).map_err(|e| ContinuationError::Config(e.to_string()))
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ContinuationError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }
}

/// [`RuntimeConfig`] backed by [`RuntimeSettings`] and a single manager
///
/// The manager is attached after construction since it holds the config
/// itself; the config keeps only a weak reference back.
pub struct BasicRuntimeConfig {
    settings: RuntimeSettings,
    clone: AtomicBool,
    manager: OnceCell<Weak<ContinuationManager>>,
}

impl BasicRuntimeConfig {
    /// Create from settings, no manager attached yet
    pub fn new(settings: RuntimeSettings) -> Self {
        let clone = AtomicBool::new(settings.clone_continuations);
        Self {
            settings,
            clone,
            manager: OnceCell::new(),
        }
    }

    /// Attach the manager; returns `false` if one was attached already
    pub fn attach(&self, manager: &Arc<ContinuationManager>) -> bool {
        self.manager.set(Arc::downgrade(manager)).is_ok()
    }

    /// Switch clone-on-resume
    pub fn set_clone_continuations(&self, clone: bool) {
        self.clone.store(clone, Ordering::SeqCst);
    }

    /// Current clone-on-resume setting
    pub fn clones(&self) -> bool {
        self.clone.load(Ordering::SeqCst)
    }

    /// Settings this config was built from
    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }
}

impl Default for BasicRuntimeConfig {
    fn default() -> Self {
        Self::new(RuntimeSettings::default())
    }
}

impl RuntimeConfig for BasicRuntimeConfig {
    fn continuation_duration(&self) -> Duration {
        Duration::from_millis(self.settings.duration_ms)
    }

    fn purge_frequency(&self) -> u32 {
        self.settings.purge_frequency
    }

    fn purge_scale(&self) -> u32 {
        self.settings.purge_scale
    }

    fn continuation_manager(&self, _executing: &ObjectRef) -> Option<Arc<ContinuationManager>> {
        self.manager.get().and_then(Weak::upgrade)
    }

    fn clone_continuations(&self, _continuable: &ObjectRef) -> bool {
        self.clones()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    #[test]
    fn test_settings_defaults_and_toml() {
        let defaults = RuntimeSettings::default();
        assert_eq!(defaults.duration_ms, 1_200_000);
        assert_eq!(defaults.purge_frequency, 20);
        assert_eq!(defaults.purge_scale, 1000);
        assert!(defaults.clone_continuations);

        let parsed = RuntimeSettings::from_toml_str("duration_ms = 50\nclone_continuations = false").unwrap();
        assert_eq!(parsed.duration_ms, 50);
        assert_eq!(parsed.purge_scale, 1000);
        assert!(!parsed.clone_continuations);
    }

    #[test]
    fn test_settings_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.toml");
        std::fs::write(&path, "purge_frequency = 0\n").unwrap();
        assert_eq!(RuntimeSettings::load(&path).unwrap().purge_frequency, 0);
        assert!(matches!(
            RuntimeSettings::load(&dir.path().join("missing.toml")),
            Err(ContinuationError::Config(_))
        ));
    }

    #[test]
    fn test_manager_is_attached_once() {
        let config = Arc::new(BasicRuntimeConfig::default());
        let manager = Arc::new(ContinuationManager::new(config.clone()));
        let obj = ObjectRef::new_instance("app/Flow", true, FxHashMap::default());
        assert!(config.continuation_manager(&obj).is_none());

        assert!(config.attach(&manager));
        assert!(!config.attach(&manager));
        assert!(Arc::ptr_eq(&config.continuation_manager(&obj).unwrap(), &manager));

        config.set_clone_continuations(false);
        assert!(!config.clone_continuations(&obj));
    }
}
