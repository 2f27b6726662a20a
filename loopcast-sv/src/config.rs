//! loopcast-sv specific configuration

use std::path::PathBuf;

/// Stream supervisor service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// Transcoder executable name or path
    pub transcoder_bin: String,
    /// Session settings record (JSON)
    pub settings_path: PathBuf,
    /// Operator-facing session log file
    pub log_path: PathBuf,
}
