//! Standard paths used by tempo

use std::path::PathBuf;

/// Environment variable that relocates both data and config
pub const HOME_ENV: &str = "TEMPO_HOME";

/// Standard tempo paths
#[derive(Debug, Clone)]
pub struct Paths {
    /// Data directory (~/.local/share/tempo)
    pub data: PathBuf,
    /// Config directory (~/.config/tempo)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        if let Some(home) = std::env::var_os(HOME_ENV) {
            return Self::rooted(PathBuf::from(home));
        }

        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("tempo");

        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("tempo");

        Self { data, config }
    }

    /// Keep data and config under a single root
    pub fn rooted(root: PathBuf) -> Self {
        Self {
            data: root.join("data"),
            config: root.join("config"),
        }
    }

    /// Path of the JSON config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.json")
    }

    /// Path of the SQLite database holding projects, tasks and sessions
    pub fn database(&self) -> PathBuf {
        self.data.join("tempo.db")
    }

    /// Path of the persisted focus-cycle settings
    pub fn focus_settings(&self) -> PathBuf {
        self.data.join("focus_settings.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rooted_layout() {
        let paths = Paths::rooted(PathBuf::from("/tmp/tempo-test"));
        assert_eq!(paths.database(), PathBuf::from("/tmp/tempo-test/data/tempo.db"));
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/tmp/tempo-test/config/config.json")
        );
        assert_eq!(
            paths.focus_settings(),
            PathBuf::from("/tmp/tempo-test/data/focus_settings.json")
        );
    }
}
