//! # Loopcast Stream Supervisor (loopcast-sv)
//!
//! Keeps an external transcoder streaming a file or a folder of files to a
//! destination endpoint: playlist resolution, invocation building, process
//! supervision with restart backoff, output draining, and guaranteed
//! process-tree cleanup on stop, behind an HTTP/SSE control surface.

pub mod api;
pub mod config;
pub mod session_log;
pub mod state;
pub mod supervisor;

pub use config::Config;
pub use state::SharedState;
pub use supervisor::StreamSupervisor;
