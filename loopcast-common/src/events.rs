//! Event types for the loopcast event system
//!
//! Events are broadcast by the stream supervisor and can be serialized for
//! SSE transmission to any connected control surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public supervisor status
///
/// The single source of truth for "what the streamer is doing right now".
/// Owned by the supervisor task; everything else reads it through shared
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorStatus {
    /// No session active, controls enabled
    Idle,
    /// Start requested, validation passed, first spawn pending
    Starting,
    /// Transcoder process running
    Running,
    /// Unexpected exit observed, waiting out the backoff before re-spawn
    Restarting,
    /// Stop requested or fatal error; termination escalation in progress
    Stopping,
}

impl std::fmt::Display for SupervisorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SupervisorStatus::Idle => "idle",
            SupervisorStatus::Starting => "starting",
            SupervisorStatus::Running => "running",
            SupervisorStatus::Restarting => "restarting",
            SupervisorStatus::Stopping => "stopping",
        };
        write!(f, "{}", s)
    }
}

/// Severity of a forwarded transcoder output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSeverity {
    /// Periodic progress report (sampled, not every line)
    Progress,
    /// Error line, always forwarded
    Error,
}

/// Loopcast event types
///
/// Broadcast on the shared event channel and forwarded verbatim over SSE.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopcastEvent {
    /// Supervisor status changed
    StatusChanged {
        old_status: SupervisorStatus,
        new_status: SupervisorStatus,
        timestamp: DateTime<Utc>,
    },

    /// A playlist item started streaming
    ItemStarted {
        session_id: Uuid,
        /// Item path as displayed to the operator
        item: String,
        /// Zero-based position within the current pass
        position: usize,
        /// Item count of the current pass
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// A playlist item's transcoder process exited
    ItemFinished {
        session_id: Uuid,
        item: String,
        /// Exit code when the process exited normally
        exit_code: Option<i32>,
        timestamp: DateTime<Utc>,
    },

    /// Unexpected exit; re-spawn scheduled after the backoff delay
    RestartScheduled {
        session_id: Uuid,
        /// Spawn attempt number the restart will become
        attempt: u32,
        delay_secs: u64,
        timestamp: DateTime<Utc>,
    },

    /// Classified line of transcoder output
    TranscoderOutput {
        severity: OutputSeverity,
        line: String,
        timestamp: DateTime<Utc>,
    },

    /// Fatal condition; session is being torn down, no restart follows
    FatalError {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl LoopcastEvent {
    /// SSE event name for this variant
    pub fn kind(&self) -> &'static str {
        match self {
            LoopcastEvent::StatusChanged { .. } => "status_changed",
            LoopcastEvent::ItemStarted { .. } => "item_started",
            LoopcastEvent::ItemFinished { .. } => "item_finished",
            LoopcastEvent::RestartScheduled { .. } => "restart_scheduled",
            LoopcastEvent::TranscoderOutput { .. } => "transcoder_output",
            LoopcastEvent::FatalError { .. } => "fatal_error",
        }
    }
}
