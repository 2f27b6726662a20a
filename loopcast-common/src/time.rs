//! Timestamp utilities

use chrono::{DateTime, Local, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Local wall-clock timestamp for session log lines, `HH:MM:SS`
pub fn log_timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}
