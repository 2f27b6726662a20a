//! Stream supervisor state machine
//!
//! Orchestrates playlist resolution, spawning, output draining, restart
//! backoff, and termination escalation for one session at a time. The
//! session task is the sole owner of the process handle, the playlist
//! pass, and the restart counter; the control surface only flips the run
//! flag and reads shared state.

use crate::session_log::SessionLog;
use crate::state::SharedState;
use crate::supervisor::drain::{self, DrainedLine, OUTPUT_QUEUE_CAPACITY, PROGRESS_THROTTLE};
use crate::supervisor::invocation::{self, EncodingProfile, Endpoint};
use crate::supervisor::playlist;
use crate::supervisor::process::{
    ProcessController, SpawnedProcess, GRACEFUL_TIMEOUT, SWEEP_POLL_INTERVAL, SWEEP_VERIFY_TIMEOUT,
};
use crate::supervisor::{SourceDescriptor, StreamSession};
use loopcast_common::config::SessionSettings;
use loopcast_common::{time, Error, LoopcastEvent, Result, SupervisorStatus};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Backoff between an unexpected exit and the next spawn attempt
const RESTART_BACKOFF: Duration = Duration::from_secs(5);

/// Wait before re-scanning a source that yielded no items
const EMPTY_SOURCE_RETRY: Duration = Duration::from_secs(5);

/// Pause between consecutive playlist items
const INTER_ITEM_PAUSE: Duration = Duration::from_secs(1);

/// Granularity at which waits observe a stop request
const CANCEL_POLL: Duration = Duration::from_secs(1);

/// Handle to the running session task
struct ActiveSession {
    run_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Stream supervisor - one session at a time
pub struct StreamSupervisor {
    controller: Arc<ProcessController>,
    state: Arc<SharedState>,
    log: Arc<SessionLog>,
    active: Mutex<Option<ActiveSession>>,
}

impl StreamSupervisor {
    pub fn new(
        transcoder_bin: impl Into<String>,
        state: Arc<SharedState>,
        log: Arc<SessionLog>,
    ) -> Self {
        Self {
            controller: Arc::new(ProcessController::new(transcoder_bin)),
            state,
            log,
            active: Mutex::new(None),
        }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Start a session
    ///
    /// Validates synchronously; on any validation failure nothing is
    /// spawned and the status stays `Idle`. On success the session task is
    /// spawned and its id returned.
    pub async fn start(
        &self,
        settings: &SessionSettings,
        profile: EncodingProfile,
    ) -> Result<Uuid> {
        let mut active = self.active.lock().await;
        if let Some(session) = active.as_ref() {
            if !session.task.is_finished() {
                return Err(Error::SessionActive);
            }
        }

        let source = SourceDescriptor::from_path(&settings.source)?;
        if settings.stream_key.trim().is_empty() {
            return Err(Error::Validation("stream key is empty".to_string()));
        }
        if settings.endpoint_base.trim().is_empty() {
            return Err(Error::Validation("endpoint base URL is empty".to_string()));
        }

        let session = StreamSession {
            id: Uuid::new_v4(),
            source,
            endpoint: Endpoint {
                base: settings.endpoint_base.clone(),
                key: settings.stream_key.clone(),
            },
            profile,
        };
        let session_id = session.id;

        // Fresh run flag per session: once cleared it is never set again
        let (run_tx, run_rx) = watch::channel(true);

        self.state.reset_restart_count();
        self.state.set_session_id(Some(session_id)).await;
        self.state.set_status(SupervisorStatus::Starting).await;
        self.log
            .append(&format!("Starting stream: {}", session.source.path().display()));
        info!(%session_id, source = %session.source.path().display(), "Session starting");

        let ctx = SessionContext {
            session,
            controller: Arc::clone(&self.controller),
            state: Arc::clone(&self.state),
            log: Arc::clone(&self.log),
            run_rx,
        };
        let task = tokio::spawn(run_session(ctx));
        *active = Some(ActiveSession { run_tx, task });

        Ok(session_id)
    }

    /// Request the active session to stop
    ///
    /// Idempotent and safe to call when already idle. Returns immediately;
    /// the session task performs the termination escalation and flips the
    /// status back to `Idle` within a bounded time.
    pub async fn stop(&self) {
        let active = self.active.lock().await;
        if let Some(session) = active.as_ref() {
            info!("Stop requested");
            let _ = session.run_tx.send(false);
        }
    }

    /// Wait for the current session task to finish (shutdown path)
    pub async fn join_session(&self) {
        let taken = self.active.lock().await.take();
        if let Some(session) = taken {
            let _ = session.task.await;
        }
    }
}

/// Everything the session task owns
struct SessionContext {
    session: StreamSession,
    controller: Arc<ProcessController>,
    state: Arc<SharedState>,
    log: Arc<SessionLog>,
    run_rx: watch::Receiver<bool>,
}

/// Result of waiting on a spawned process
enum ExitOutcome {
    /// Process exited on its own
    Exited(std::process::ExitStatus),
    /// Stop requested while the process was still running
    StopRequested,
    /// The wait itself failed; process state unknown
    WaitFailed(Error),
}

async fn run_session(ctx: SessionContext) {
    let SessionContext {
        session,
        controller,
        state,
        log,
        mut run_rx,
    } = ctx;

    run_stream_loop(&session, &controller, &state, &log, &mut run_rx).await;

    // Stop sequence: whatever ended the loop, leave no transcoder behind.
    state.set_status(SupervisorStatus::Stopping).await;
    log.append("Checking for remaining transcoder processes...");
    controller.sweep_by_name();

    let verified = controller
        .wait_for_name_absence(SWEEP_POLL_INTERVAL, SWEEP_VERIFY_TIMEOUT)
        .await;
    if !verified {
        warn!("Transcoder processes still present after cleanup, sweeping again");
        log.append("Warning: transcoder still running after cleanup, forcing final sweep");
        controller.sweep_by_name();
    }

    state.set_current_item(None).await;
    state.set_session_id(None).await;
    state.set_status(SupervisorStatus::Idle).await;
    log.append("Stream stopped");
    info!(session_id = %session.id, "Session ended");
}

async fn run_stream_loop(
    session: &StreamSession,
    controller: &Arc<ProcessController>,
    state: &Arc<SharedState>,
    log: &Arc<SessionLog>,
    run_rx: &mut watch::Receiver<bool>,
) {
    'session: while *run_rx.borrow() {
        // One full pass; folder sources are re-scanned here every time so
        // additions show up on the next pass, never mid-item
        let items = match playlist::resolve(&session.source) {
            Ok(items) => items,
            Err(e) => {
                warn!("Playlist resolution failed: {}", e);
                log.append(&format!("Cannot read source: {}", e));
                if !wait_while_running(run_rx, EMPTY_SOURCE_RETRY).await {
                    break;
                }
                continue;
            }
        };
        if items.is_empty() {
            log.append("No media files found in source folder, waiting...");
            if !wait_while_running(run_rx, EMPTY_SOURCE_RETRY).await {
                break;
            }
            continue;
        }

        let total = items.len();
        info!(total, "Resolved playlist pass");

        for (position, item) in items.iter().enumerate() {
            if !*run_rx.borrow() {
                break 'session;
            }
            if !item.is_file() {
                // Vanished between scan and spawn: skip, never fatal
                log.append(&format!("Skipping missing item: {}", item.display()));
                continue;
            }

            let attempt = state.increment_restart_count();
            let item_label = item.display().to_string();
            let args = invocation::build(
                item,
                session.profile,
                &session.endpoint,
                session.source.loops_input(),
            );

            let mut proc = match controller.spawn(&args) {
                Ok(proc) => proc,
                Err(Error::TranscoderNotFound(program)) => {
                    let message = format!(
                        "Transcoder '{}' not found. Install it and make sure it is on the PATH.",
                        program
                    );
                    error!("{}", message);
                    log.append(&message);
                    state.broadcast_event(LoopcastEvent::FatalError {
                        message,
                        timestamp: time::now(),
                    });
                    break 'session;
                }
                Err(e) => {
                    warn!(attempt, "Spawn failed: {}", e);
                    log.append(&format!("Failed to start transcoder: {}", e));
                    if !wait_while_running(run_rx, RESTART_BACKOFF).await {
                        break 'session;
                    }
                    continue;
                }
            };

            state.set_current_item(Some(item_label.clone())).await;
            state.set_status(SupervisorStatus::Running).await;
            state.broadcast_event(LoopcastEvent::ItemStarted {
                session_id: session.id,
                item: item_label.clone(),
                position,
                total,
                timestamp: time::now(),
            });
            log.append(&format!("Streaming: {}", item_label));

            attach_drains(&mut proc, state, log, run_rx.clone());

            match wait_for_exit(&mut proc, run_rx).await {
                ExitOutcome::StopRequested => {
                    terminate_process(controller, &mut proc, state, log).await;
                    break 'session;
                }
                ExitOutcome::Exited(status) => {
                    let exit_code = status.code();
                    state.broadcast_event(LoopcastEvent::ItemFinished {
                        session_id: session.id,
                        item: item_label.clone(),
                        exit_code,
                        timestamp: time::now(),
                    });
                    // Handle is dropped here: confirmed dead, nothing to keep
                    drop(proc);
                    state.set_current_item(None).await;

                    if !*run_rx.borrow() {
                        break 'session;
                    }

                    match &session.source {
                        SourceDescriptor::Folder(_) => {
                            if status.success() {
                                log.append(&format!("Finished {}. Moving to next...", item_label));
                            } else {
                                warn!(?exit_code, item = %item_label, "Transcoder exited abnormally");
                                log.append(&format!(
                                    "Transcoder exited with {:?} on {}. Moving to next...",
                                    exit_code, item_label
                                ));
                            }
                            if !wait_while_running(run_rx, INTER_ITEM_PAUSE).await {
                                break 'session;
                            }
                        }
                        SourceDescriptor::File(_) => {
                            // A looping input never exits on its own, so any
                            // exit here is a disconnect worth a restart
                            state.set_status(SupervisorStatus::Restarting).await;
                            let next_attempt = state.restart_count() + 1;
                            state.broadcast_event(LoopcastEvent::RestartScheduled {
                                session_id: session.id,
                                attempt: next_attempt,
                                delay_secs: RESTART_BACKOFF.as_secs(),
                                timestamp: time::now(),
                            });
                            log.append(&format!(
                                "Stream disconnected (exit {:?}). Restarting (attempt {})...",
                                exit_code, next_attempt
                            ));
                            if !wait_while_running(run_rx, RESTART_BACKOFF).await {
                                break 'session;
                            }
                        }
                    }
                }
                ExitOutcome::WaitFailed(e) => {
                    warn!("Wait on transcoder failed: {}", e);
                    log.append(&format!("Lost track of transcoder process: {}", e));
                    terminate_process(controller, &mut proc, state, log).await;
                    drop(proc);
                    state.set_current_item(None).await;
                    if !wait_while_running(run_rx, RESTART_BACKOFF).await {
                        break 'session;
                    }
                }
            }
        }
    }
}

/// Wait until the process exits or a stop request arrives
async fn wait_for_exit(
    proc: &mut SpawnedProcess,
    run_rx: &mut watch::Receiver<bool>,
) -> ExitOutcome {
    loop {
        tokio::select! {
            status = proc.wait() => {
                return match status {
                    Ok(status) => ExitOutcome::Exited(status),
                    Err(e) => ExitOutcome::WaitFailed(e),
                };
            }
            changed = run_rx.changed() => {
                if changed.is_err() || !*run_rx.borrow() {
                    return ExitOutcome::StopRequested;
                }
            }
        }
    }
}

/// Per-process termination escalation: graceful terminate, then kill-tree
async fn terminate_process(
    controller: &Arc<ProcessController>,
    proc: &mut SpawnedProcess,
    state: &Arc<SharedState>,
    log: &Arc<SessionLog>,
) {
    state.set_status(SupervisorStatus::Stopping).await;
    log.append("Terminating transcoder process...");

    if controller.terminate_graceful(proc, GRACEFUL_TIMEOUT).await {
        log.append("Transcoder exited after terminate signal");
    } else {
        warn!(pid = proc.pid(), "Graceful terminate timed out, killing process tree");
        log.append("Transcoder did not exit, force-killing process tree");
        controller.kill_tree(proc).await;
    }
}

/// Attach output drains and the line forwarder to a fresh process
fn attach_drains(
    proc: &mut SpawnedProcess,
    state: &Arc<SharedState>,
    log: &Arc<SessionLog>,
    run_rx: watch::Receiver<bool>,
) {
    let (line_tx, mut line_rx) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);

    if let Some(stdout) = proc.take_stdout() {
        drain::spawn_drain(stdout, line_tx.clone(), PROGRESS_THROTTLE, run_rx.clone());
    }
    if let Some(stderr) = proc.take_stderr() {
        drain::spawn_drain(stderr, line_tx.clone(), PROGRESS_THROTTLE, run_rx);
    }
    drop(line_tx);

    let state = Arc::clone(state);
    let log = Arc::clone(log);
    tokio::spawn(async move {
        // Ends when both drains finish and drop their senders
        while let Some(DrainedLine { severity, text }) = line_rx.recv().await {
            log.append(&text);
            state.broadcast_event(LoopcastEvent::TranscoderOutput {
                severity,
                line: text,
                timestamp: time::now(),
            });
        }
    });
}

/// Sleep for `total`, observing the run flag about once per second
///
/// Returns false as soon as a stop request is seen, true when the full
/// duration elapsed with the flag still set.
async fn wait_while_running(run_rx: &mut watch::Receiver<bool>, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if !*run_rx.borrow() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        let step = CANCEL_POLL.min(deadline - now);
        tokio::select! {
            _ = sleep(step) => {}
            changed = run_rx.changed() => {
                if changed.is_err() || !*run_rx.borrow() {
                    return false;
                }
            }
        }
    }
}
