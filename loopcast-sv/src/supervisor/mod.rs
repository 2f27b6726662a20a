//! Stream supervision: playlist resolution, invocation building, process
//! control, output draining, and the session state machine tying them
//! together

pub mod drain;
pub mod engine;
pub mod invocation;
pub mod playlist;
pub mod process;

pub use engine::StreamSupervisor;
pub use invocation::{EncodingProfile, Endpoint};

use loopcast_common::{Error, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Media source: one file played in a loop, or a folder cycled item by item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    File(PathBuf),
    Folder(PathBuf),
}

impl SourceDescriptor {
    /// Classify and validate an operator-supplied source path
    pub fn from_path(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::Validation("no media source configured".to_string()));
        }
        let path = PathBuf::from(raw);
        if path.is_dir() {
            Ok(SourceDescriptor::Folder(path))
        } else if path.is_file() {
            Ok(SourceDescriptor::File(path))
        } else {
            Err(Error::Validation(format!(
                "media source not found: {}",
                path.display()
            )))
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            SourceDescriptor::File(path) | SourceDescriptor::Folder(path) => path,
        }
    }

    /// Single files loop indefinitely inside one transcoder invocation;
    /// folder items play once each
    pub fn loops_input(&self) -> bool {
        matches!(self, SourceDescriptor::File(_))
    }
}

/// One streaming session, immutable for its duration
#[derive(Debug, Clone)]
pub struct StreamSession {
    pub id: Uuid,
    pub source: SourceDescriptor,
    pub endpoint: Endpoint,
    pub profile: EncodingProfile,
}
