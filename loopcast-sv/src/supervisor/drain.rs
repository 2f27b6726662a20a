//! Transcoder output drain
//!
//! Reads a spawned process's output stream line by line on its own task,
//! classifies each line, and forwards the interesting ones into a bounded
//! channel. The producer side never blocks: a full queue drops the line so
//! a slow consumer can never back-pressure the transcoder's own pipe.

use loopcast_common::events::OutputSeverity;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, trace};

/// Marker identifying a periodic progress report line
pub const PROGRESS_MARKER: &str = "fps=";

/// Marker identifying an error line
pub const ERROR_MARKER: &str = "Error";

/// Minimum interval between forwarded progress lines
pub const PROGRESS_THROTTLE: Duration = Duration::from_secs(4);

/// Bounded capacity of the per-process output queue
pub const OUTPUT_QUEUE_CAPACITY: usize = 64;

/// One classified, forwarded output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainedLine {
    pub severity: OutputSeverity,
    pub text: String,
}

/// Classify one output line; `None` means the line is dropped
///
/// Error lines win over progress lines when a line carries both markers,
/// since errors are forwarded unconditionally.
pub fn classify(line: &str) -> Option<OutputSeverity> {
    if line.contains(ERROR_MARKER) {
        Some(OutputSeverity::Error)
    } else if line.contains(PROGRESS_MARKER) {
        Some(OutputSeverity::Progress)
    } else {
        None
    }
}

/// Periodic gate for progress-line sampling
///
/// Explicit interval check against a monotonic clock, so sampling is
/// deterministic under tokio's paused test time.
pub struct ThrottleGate {
    period: Duration,
    last: Option<Instant>,
}

impl ThrottleGate {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// True when enough time has passed since the last allowed call
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Spawn a drain task for one output stream
///
/// The task ends when the stream closes (process exited) or when the run
/// flag clears; it never blocks past either point.
pub fn spawn_drain<R>(
    stream: R,
    tx: mpsc::Sender<DrainedLine>,
    throttle: Duration,
    mut run: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        let mut gate = ThrottleGate::new(throttle);

        loop {
            let line = tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Output stream read error: {}", e);
                        break;
                    }
                },
                changed = run.changed() => {
                    if changed.is_err() || !*run.borrow() {
                        break;
                    }
                    continue;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Some(severity) = classify(trimmed) else {
                continue;
            };
            if severity == OutputSeverity::Progress && !gate.allow() {
                continue;
            }
            if tx
                .try_send(DrainedLine {
                    severity,
                    text: trimmed.to_string(),
                })
                .is_err()
            {
                // Queue full or consumer gone: drop rather than stall
                trace!("Output queue full, dropping line");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_progress_and_error_lines() {
        assert_eq!(
            classify("frame=  100 fps= 30 q=23.0"),
            Some(OutputSeverity::Progress)
        );
        assert_eq!(
            classify("Error writing trailer: Broken pipe"),
            Some(OutputSeverity::Error)
        );
        assert_eq!(classify("Stream mapping:"), None);
    }

    #[test]
    fn classify_prefers_error_over_progress() {
        assert_eq!(
            classify("fps= 30 Error: dropped frames"),
            Some(OutputSeverity::Error)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_gate_samples_by_period() {
        let mut gate = ThrottleGate::new(Duration::from_secs(4));

        assert!(gate.allow());
        assert!(!gate.allow());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!gate.allow());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(gate.allow());
        assert!(!gate.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_forwards_classified_lines() {
        let input: &[u8] = b"Stream mapping:\n\
            frame=1 fps=25 q=20\n\
            frame=2 fps=25 q=20\n\
            Error while decoding stream\n";
        let (tx, mut rx) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);
        let (_run_tx, run_rx) = watch::channel(true);

        let handle = spawn_drain(input, tx, PROGRESS_THROTTLE, run_rx);
        handle.await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.severity, OutputSeverity::Progress);
        assert!(first.text.contains("frame=1"));

        // Second progress line fell inside the throttle period
        let second = rx.recv().await.unwrap();
        assert_eq!(second.severity, OutputSeverity::Error);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn drain_stops_when_run_flag_clears() {
        // A pipe that never produces data; the drain must still end
        let (_writer, reader) = tokio::io::duplex(64);
        let (tx, _rx) = mpsc::channel(4);
        let (run_tx, run_rx) = watch::channel(true);

        let handle = spawn_drain(reader, tx, PROGRESS_THROTTLE, run_rx);
        run_tx.send(false).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("drain task did not stop on run flag clear")
            .unwrap();
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let input: &[u8] = b"Error one\nError two\nError three\n";
        let (tx, mut rx) = mpsc::channel(1);
        let (_run_tx, run_rx) = watch::channel(true);

        // Consumer never reads until the drain is done; producer must not hang
        let handle = spawn_drain(input, tx, PROGRESS_THROTTLE, run_rx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("drain blocked on a full queue")
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.text, "Error one");
        assert!(rx.recv().await.is_none());
    }
}
