//! Operator-facing session log
//!
//! One line per event, `[HH:MM:SS] message`, appended to a single file
//! that a running session never truncates. Write failures degrade to a
//! tracing warning; the stream must not die because the log disk is full.

use loopcast_common::{time, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

pub struct SessionLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl SessionLog {
    /// Open (or create) the log file in append mode
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line
    pub fn append(&self, message: &str) {
        let line = format!("[{}] {}\n", time::log_timestamp(), message);
        match self.file.lock() {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    warn!("Session log write failed: {}", e);
                }
            }
            Err(_) => warn!("Session log mutex poisoned, line dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_writes_timestamped_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.log");

        let log = SessionLog::open(&path).unwrap();
        log.append("Stream started");
        log.append("Stream stopped");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("] Stream started"));
        assert!(lines[0].starts_with('['));
        // "[HH:MM:SS] " prefix is 11 chars
        assert_eq!(&lines[0][9..11], "] ");
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stream.log");

        SessionLog::open(&path).unwrap().append("first run");
        SessionLog::open(&path).unwrap().append("second run");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("first run"));
        assert!(contents.contains("second run"));
    }
}
