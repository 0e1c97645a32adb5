//! Instrumentation naming contract
//!
//! Which classes are continuable, which method is the entry point, and which
//! calls suspend. A name set to `None` disables that suspension flavor.

use crate::error::{ContinuationError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Names and descriptors the instrumentation recognizes
pub trait InstrumentConfig: Send + Sync {
    /// Interface that marks a class as continuable
    fn marker_interface(&self) -> &str;

    /// Class that declares the suspension methods, if not the continuable itself
    fn support_class(&self) -> Option<&str>;

    /// Name of the entry method
    fn entry_method_name(&self) -> &str;

    /// Descriptor of the entry method
    fn entry_method_descriptor(&self) -> &str;

    /// Name of the pause method (`()V`)
    fn pause_method_name(&self) -> Option<&str>;

    /// Name of the step-back method (`()V`)
    fn step_back_method_name(&self) -> Option<&str>;

    /// Name of the call method
    fn call_method_name(&self) -> Option<&str>;

    /// Descriptor of the call method
    fn call_method_descriptor(&self) -> &str;

    /// Internal name of the call method's return type
    fn call_method_return_type(&self) -> &str;

    /// Name of the answer method (`()V` or `(Lrt/Object;)V`)
    fn answer_method_name(&self) -> Option<&str>;
}

fn default_marker() -> String {
    "rt/Continuable".to_string()
}

fn default_support() -> Option<String> {
    Some("rt/ContinuableObject".to_string())
}

fn default_entry_name() -> String {
    "execute".to_string()
}

fn default_entry_descriptor() -> String {
    "()V".to_string()
}

fn default_pause() -> Option<String> {
    Some("pause".to_string())
}

fn default_step_back() -> Option<String> {
    Some("stepBack".to_string())
}

fn default_call() -> Option<String> {
    Some("call".to_string())
}

fn default_call_descriptor() -> String {
    "(Lrt/Object;)Lrt/Object;".to_string()
}

fn default_call_return() -> String {
    "rt/Object".to_string()
}

fn default_answer() -> Option<String> {
    Some("answer".to_string())
}

/// Plain-data [`InstrumentConfig`], loadable from TOML
///
/// ```toml
/// marker_interface = "app/Flow"
/// entry_name = "run"
/// step_back = ""        # disabled
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicInstrumentConfig {
    /// Marker interface
    pub marker_interface: String,
    /// Support class declaring the suspension methods
    pub support_class: Option<String>,
    /// Entry method name
    pub entry_name: String,
    /// Entry method descriptor
    pub entry_descriptor: String,
    /// Pause method name
    pub pause: Option<String>,
    /// Step-back method name
    pub step_back: Option<String>,
    /// Call method name
    pub call: Option<String>,
    /// Call method descriptor
    pub call_descriptor: String,
    /// Call method return type
    pub call_return_type: String,
    /// Answer method name
    pub answer: Option<String>,
}

impl Default for BasicInstrumentConfig {
    fn default() -> Self {
        Self {
            marker_interface: default_marker(),
            support_class: default_support(),
            entry_name: default_entry_name(),
            entry_descriptor: default_entry_descriptor(),
            pause: default_pause(),
            step_back: default_step_back(),
            call: default_call(),
            call_descriptor: default_call_descriptor(),
            call_return_type: default_call_return(),
            answer: default_answer(),
        }
    }
}

impl BasicInstrumentConfig {
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

/// Empty names count as unset so TOML can disable a flavor with `""`
fn non_empty(name: &Option<String>) -> Option<&str> {
    name.as_deref().filter(|n| !n.is_empty())
}

impl InstrumentConfig for BasicInstrumentConfig {
    fn marker_interface(&self) -> &str {
        &self.marker_interface
    }

    fn support_class(&self) -> Option<&str> {
        non_empty(&self.support_class)
    }

    fn entry_method_name(&self) -> &str {
        &self.entry_name
    }

    fn entry_method_descriptor(&self) -> &str {
        &self.entry_descriptor
    }

    fn pause_method_name(&self) -> Option<&str> {
        non_empty(&self.pause)
    }

    fn step_back_method_name(&self) -> Option<&str> {
        non_empty(&self.step_back)
    }

    fn call_method_name(&self) -> Option<&str> {
        non_empty(&self.call)
    }

    fn call_method_descriptor(&self) -> &str {
        &self.call_descriptor
    }

    fn call_method_return_type(&self) -> &str {
        &self.call_return_type
    }

    fn answer_method_name(&self) -> Option<&str> {
        non_empty(&self.answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BasicInstrumentConfig::default();
        assert_eq!(config.marker_interface(), "rt/Continuable");
        assert_eq!(config.entry_method_descriptor(), "()V");
        assert_eq!(config.pause_method_name(), Some("pause"));
        assert_eq!(config.call_method_return_type(), "rt/Object");
    }

    #[test]
    fn test_toml_overrides_and_disables() {
        let config = BasicInstrumentConfig::from_toml_str(
            r#"
            marker_interface = "app/Flow"
            entry_name = "run"
            step_back = ""
            "#,
        )
        .unwrap();
        assert_eq!(config.marker_interface(), "app/Flow");
        assert_eq!(config.entry_method_name(), "run");
        assert_eq!(config.step_back_method_name(), None);
        assert_eq!(config.pause_method_name(), Some("pause"));
    }

    #[test]
    fn test_toml_error_is_config_error() {
        let err = BasicInstrumentConfig::from_toml_str("entry_name = 3").unwrap_err();
        assert!(matches!(err, ContinuationError::Config(_)));
    }
}
