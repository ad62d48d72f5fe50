//! Configuration management for tempo

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global tempo configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Refresh period of the task timer and live displays (milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Suffix printed after money amounts
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Start the next focus phase without asking once one completes
    #[serde(default)]
    pub auto_advance: bool,

    /// Override for the directory holding the database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_currency() -> String {
    "₽".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            currency: default_currency(),
            auto_advance: false,
            data_dir: None,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Tick period, never shorter than 10ms
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.tick_interval_ms, 1000);
        assert_eq!(config.currency, "₽");
        assert!(!config.auto_advance);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_partial_file_merges_over_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"auto_advance": true}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.auto_advance);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }
}
