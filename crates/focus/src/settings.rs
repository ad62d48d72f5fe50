//! Focus-cycle settings and their persistence
//!
//! Settings live in `focus_settings.json` next to the database. A file with
//! only some keys is merged over the defaults; a missing or unreadable file
//! means defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Phase lengths and the long-break cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FocusSettings {
    pub work_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    /// Every n-th completed work phase is followed by a long break
    pub sessions_until_long_break: u32,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            work_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            sessions_until_long_break: 4,
        }
    }
}

/// A partial change to [`FocusSettings`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub work_minutes: Option<u32>,
    pub short_break_minutes: Option<u32>,
    pub long_break_minutes: Option<u32>,
    pub sessions_until_long_break: Option<u32>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl FocusSettings {
    /// Apply the fields present in `update`
    pub fn merged(mut self, update: &SettingsUpdate) -> Self {
        if let Some(v) = update.work_minutes {
            self.work_minutes = v;
        }
        if let Some(v) = update.short_break_minutes {
            self.short_break_minutes = v;
        }
        if let Some(v) = update.long_break_minutes {
            self.long_break_minutes = v;
        }
        if let Some(v) = update.sessions_until_long_break {
            self.sessions_until_long_break = v;
        }
        self
    }
}

/// Persistence for focus settings
pub trait SettingsStore: Send + Sync + Debug {
    fn load(&self) -> Result<FocusSettings>;
    fn save(&self, settings: &FocusSettings) -> Result<()>;
}

/// Settings kept as a JSON file
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<FocusSettings> {
        if !self.path.exists() {
            return Ok(FocusSettings::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read focus settings: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse focus settings: {}", self.path.display()))
    }

    fn save(&self, settings: &FocusSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }
        let content = serde_json::to_string_pretty(settings)
            .context("Failed to serialize focus settings")?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write focus settings: {}", self.path.display()))
    }
}

/// Settings kept in memory only
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    saved: Mutex<Option<FocusSettings>>,
    fail: bool,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start out with `settings` already saved
    pub fn with(settings: FocusSettings) -> Self {
        Self {
            saved: Mutex::new(Some(settings)),
            fail: false,
        }
    }

    /// A store whose every load and save fails
    pub fn failing() -> Self {
        Self {
            saved: Mutex::new(None),
            fail: true,
        }
    }

    pub fn saved(&self) -> Option<FocusSettings> {
        *self.saved.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<FocusSettings> {
        if self.fail {
            anyhow::bail!("settings storage unavailable");
        }
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, settings: &FocusSettings) -> Result<()> {
        if self.fail {
            anyhow::bail!("settings storage unavailable");
        }
        *self.saved.lock().unwrap_or_else(|e| e.into_inner()) = Some(*settings);
        Ok(())
    }
}
