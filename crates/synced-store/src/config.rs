//! Engine configuration.
//!
//! ```toml
//! debounce_ms = 50
//! log_operations = true
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("INVALID_CONFIG: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// How long read-path updates are collected before one store batch.
    #[serde(rename = "debounce_ms", deserialize_with = "millis")]
    pub debounce: Duration,
    /// Log every projected document operation at `debug` level.
    pub log_operations: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            log_operations: false,
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config = SyncConfig::from_toml_str("log_operations = true").unwrap();
        assert_eq!(config.debounce, DEFAULT_DEBOUNCE);
        assert!(config.log_operations);
    }

    #[test]
    fn debounce_is_read_in_milliseconds() {
        let config = SyncConfig::from_toml_str("debounce_ms = 120").unwrap();
        assert_eq!(config.debounce, Duration::from_millis(120));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            SyncConfig::from_toml_str("debounce = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
