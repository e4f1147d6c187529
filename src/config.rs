//! Pipeline configuration
//!
//! Loaded from a JSON file, then overridden by environment variables.

use crate::error::WearableError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable gating the whole pipeline (`true`/`false`, `1`/`0`)
pub const ENV_ENABLED: &str = "MOTION_FLUX_ENABLED";

/// Environment variable naming the SQLite database file
pub const ENV_DATABASE: &str = "MOTION_FLUX_DB";

/// Default number of recent windows handed to downstream aggregation
pub const DEFAULT_RECENT_WINDOWS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Process-wide gate; when false every operation fails with `FeatureDisabled`
    pub enabled: bool,
    /// Accept sample batches for sessions that were already flushed
    pub allow_ingest_after_flush: bool,
    /// Window count used by `recent_features` when the caller passes none
    pub recent_window_count: usize,
    /// SQLite database file; `None` keeps everything in memory
    pub database_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_ingest_after_flush: false,
            recent_window_count: DEFAULT_RECENT_WINDOWS,
            database_path: None,
        }
    }
}

impl PipelineConfig {
    /// Parse configuration JSON; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self, WearableError> {
        serde_json::from_str(json).map_err(|e| WearableError::Config(e.to_string()))
    }

    /// Read a configuration file and apply environment overrides
    pub fn load(path: &Path) -> Result<Self, WearableError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            WearableError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)?.with_env_overrides()
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self, WearableError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, WearableError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, WearableError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_ENABLED) {
            self.enabled = parse_flag(&value).ok_or_else(|| {
                WearableError::Config(format!("{ENV_ENABLED} must be a boolean, got '{value}'"))
            })?;
        }
        if let Some(value) = lookup(ENV_DATABASE).filter(|v| !v.trim().is_empty()) {
            self.database_path = Some(PathBuf::from(value));
        }
        Ok(self)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json(r#"{"allow_ingest_after_flush": true}"#).unwrap();

        assert!(config.enabled);
        assert!(config.allow_ingest_after_flush);
        assert_eq!(config.recent_window_count, DEFAULT_RECENT_WINDOWS);
    }

    #[test]
    fn test_overrides() {
        let config = PipelineConfig::default()
            .with_overrides(|key| match key {
                ENV_ENABLED => Some("off".to_string()),
                ENV_DATABASE => Some("/tmp/motion.db".to_string()),
                _ => None,
            })
            .unwrap();

        assert!(!config.enabled);
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/motion.db")));
    }

    #[test]
    fn test_bad_flag_is_rejected() {
        let result = PipelineConfig::default()
            .with_overrides(|key| (key == ENV_ENABLED).then(|| "maybe".to_string()));

        assert!(matches!(result, Err(WearableError::Config(_))));
    }
}
