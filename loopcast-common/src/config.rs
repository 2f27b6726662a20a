//! Session settings record and its on-disk JSON persistence

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persisted session settings
///
/// A flat record loaded at startup and replaced through the control
/// surface. Every field defaults to empty; an absent settings file is not
/// an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Media source: a single file path or a folder path
    #[serde(default)]
    pub source: String,
    /// Destination base URL, e.g. `rtmp://a.rtmp.youtube.com/live2/`
    #[serde(default)]
    pub endpoint_base: String,
    /// Secret stream key appended to the base URL
    #[serde(default)]
    pub stream_key: String,
}

impl SessionSettings {
    /// Load settings from `path`; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("invalid settings file {}: {}", path.display(), e)))
    }

    /// Save settings to `path`, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("settings serialization: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Default settings file location under the platform config directory
///
/// Falls back to a relative path when no config directory can be
/// determined (e.g. stripped-down containers).
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("loopcast").join("settings.json"))
        .unwrap_or_else(|| PathBuf::from("loopcast-settings.json"))
}
