//! # Loopcast Common Library
//!
//! Shared code for the loopcast services including:
//! - Error types
//! - Event types (LoopcastEvent enum) and supervisor status
//! - Session settings record (JSON persistence)
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{LoopcastEvent, SupervisorStatus};
