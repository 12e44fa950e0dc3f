//! Policy subsystem configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use sentra_authz::{ModelError, PolicyModel};

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Configuration for enforcement, propagation and the matcher model.
/// Every field has a working default, so an empty config section runs
/// with enforcement on and a five-minute sync interval.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Master switch. Disabled means every check allows with no data scope.
    pub enabled: bool,
    /// Seconds between propagation pulls. Zero falls back to the default.
    pub sync_interval_secs: u64,
    /// Optional path to a matcher model file; absent uses the embedded one.
    pub model_path: Option<PathBuf>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            model_path: None,
        }
    }
}

impl PolicyConfig {
    pub fn sync_interval(&self) -> Duration {
        let secs = if self.sync_interval_secs == 0 {
            DEFAULT_SYNC_INTERVAL_SECS
        } else {
            self.sync_interval_secs
        };
        Duration::from_secs(secs)
    }

    /// Load the matcher model: from `model_path` when set, otherwise the
    /// embedded default. A configured path that fails to load is an error,
    /// not a silent fallback.
    pub fn load_model(&self) -> Result<PolicyModel, ModelError> {
        match &self.model_path {
            Some(path) => PolicyModel::from_file(path),
            None => Ok(PolicyModel::default_model()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_section_gets_working_defaults() {
        let config: PolicyConfig = serde_json::from_str("{}").unwrap();
        assert!(config.enabled);
        assert_eq!(config.sync_interval(), Duration::from_secs(300));
        assert!(config.model_path.is_none());
        assert!(config.load_model().is_ok());
    }

    #[test]
    fn zero_interval_falls_back_to_default() {
        let config: PolicyConfig =
            serde_json::from_str(r#"{"sync_interval_secs": 0}"#).unwrap();
        assert_eq!(config.sync_interval(), Duration::from_secs(300));
    }

    #[test]
    fn explicit_values_win() {
        let config: PolicyConfig =
            serde_json::from_str(r#"{"enabled": false, "sync_interval_secs": 30}"#).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.sync_interval(), Duration::from_secs(30));
    }

    #[test]
    fn missing_model_file_is_an_error() {
        let config = PolicyConfig {
            model_path: Some(PathBuf::from("/no/such/model.conf")),
            ..Default::default()
        };
        assert!(config.load_model().is_err());
    }
}
