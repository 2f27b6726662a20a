//! Common error types for loopcast

use thiserror::Error;

/// Common result type for loopcast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the loopcast services
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid session input (missing source, missing key, bad path)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transcoder executable could not be located; fatal, never retried
    #[error("Transcoder executable not found: {0}")]
    TranscoderNotFound(String),

    /// Process spawn/signal/wait error other than a missing executable
    #[error("Process error: {0}")]
    Process(String),

    /// A streaming session is already active
    #[error("A streaming session is already active")]
    SessionActive,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
