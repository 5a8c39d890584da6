//! Engine and per-call configuration.

use serde::{Deserialize, Serialize};

/// Engine-wide settings.
///
/// Can be built in code or deserialized from JSON; missing fields take their
/// defaults:
///
/// ```
/// use kvmodel_engine::EngineConfig;
///
/// let config: EngineConfig = serde_json::from_str(r#"{"prefix":"app","publish":true}"#).unwrap();
/// assert_eq!(config.prefix, "app");
/// assert!(!config.continue_on_link_error);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Namespace prepended to every store key.
    pub prefix: String,
    /// Publish change events for models that do not set their own preference.
    pub publish: bool,
    /// Persist property changes even when some relations cannot be written.
    pub continue_on_link_error: bool,
    /// Per-subscriber buffer of the in-memory pub/sub channels.
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prefix: kvmodel_store::DEFAULT_PREFIX.to_string(),
            publish: false,
            continue_on_link_error: false,
            channel_capacity: 1024,
        }
    }
}

/// Options for a single save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Commit without running validation.
    pub skip_validation: bool,
    /// Overrides [`EngineConfig::continue_on_link_error`] for this save.
    pub continue_on_link_error: Option<bool>,
    /// Do not publish change events for this save.
    pub silent: bool,
}

impl SaveOptions {
    pub fn skip_validation(mut self) -> Self {
        self.skip_validation = true;
        self
    }

    pub fn continue_on_link_error(mut self, value: bool) -> Self {
        self.continue_on_link_error = Some(value);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}
