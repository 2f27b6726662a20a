//! Process control for the external transcoder
//!
//! Spawning, graceful termination, process-tree kill, and a name-based
//! force sweep. All platform-specific behavior lives behind the
//! `platform` seam in this module; nothing elsewhere branches on the OS.

use loopcast_common::{Error, Result};
use std::path::Path;
use std::process::Stdio;
use sysinfo::System;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::{debug, info, warn};

/// Bounded wait after the cooperative terminate signal
pub const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause between SIGTERM and SIGKILL when killing the process group
#[cfg(unix)]
const KILL_ESCALATION_PAUSE: Duration = Duration::from_millis(200);

/// Poll interval of the post-stop verification scan
pub const SWEEP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Maximum total wait of the post-stop verification scan
pub const SWEEP_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// A spawned transcoder process
///
/// Owned exclusively by the supervisor task for its whole lifetime and
/// dropped immediately after confirmed termination.
#[derive(Debug)]
pub struct SpawnedProcess {
    child: Child,
    pid: u32,
}

impl SpawnedProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Take the captured stdout handle for draining
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take the captured stderr handle for draining
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        self.child
            .wait()
            .await
            .map_err(|e| Error::Process(format!("wait failed for pid {}: {}", self.pid, e)))
    }

    /// Check liveness without blocking
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

/// OS-abstracted spawn/terminate/kill-tree/sweep primitive
pub struct ProcessController {
    program: String,
}

impl ProcessController {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Spawn the transcoder with its output captured
    ///
    /// A missing executable is the fatal [`Error::TranscoderNotFound`],
    /// distinct from any mid-run crash. On unix the child gets its own
    /// process group so the whole tree can be signalled later.
    pub fn spawn(&self, args: &[String]) -> Result<SpawnedProcess> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::TranscoderNotFound(self.program.clone()));
            }
            Err(e) => {
                return Err(Error::Process(format!(
                    "failed to spawn {}: {}",
                    self.program, e
                )));
            }
        };
        let pid = child
            .id()
            .ok_or_else(|| Error::Process("spawned process exited before pid read".to_string()))?;
        info!(pid, program = %self.program, "Transcoder process spawned");

        Ok(SpawnedProcess { child, pid })
    }

    /// Send the cooperative terminate signal and wait up to `wait`
    ///
    /// Returns true when the process exited within the bound; false means
    /// the caller must escalate to [`ProcessController::kill_tree`].
    pub async fn terminate_graceful(&self, proc: &mut SpawnedProcess, wait: Duration) -> bool {
        if !proc.is_running() {
            return true;
        }
        platform::request_terminate(proc.pid).await;

        match timeout(wait, proc.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid = proc.pid, %status, "Process exited after terminate signal");
                true
            }
            Ok(Err(e)) => {
                warn!(pid = proc.pid, "Wait after terminate failed: {}", e);
                !proc.is_running()
            }
            Err(_) => false,
        }
    }

    /// Forcibly terminate the process and every descendant it spawned
    ///
    /// After return no descendant of the original pid remains runnable.
    pub async fn kill_tree(&self, proc: &mut SpawnedProcess) {
        platform::kill_tree(proc.pid, &mut proc.child).await;

        // Reap so the entry does not linger in the process table
        if let Ok(Err(e)) = timeout(Duration::from_secs(2), proc.child.wait()).await {
            warn!(pid = proc.pid, "Reap after kill failed: {}", e);
        }
    }

    /// Force-kill every running process matching the transcoder's
    /// executable name, independent of any handle
    ///
    /// Last-resort safety net against handles lost to crashes or
    /// detachment. Returns the number of processes killed.
    pub fn sweep_by_name(&self) -> usize {
        let target = executable_name(&self.program);
        let mut system = System::new_all();
        system.refresh_processes();

        let mut killed = 0;
        for process in system.processes().values() {
            if name_matches(process.name(), &target) && process.kill() {
                killed += 1;
                debug!(pid = process.pid().as_u32(), name = process.name(), "Swept process");
            }
        }
        if killed > 0 {
            info!(killed, name = %target, "Force-killed remaining transcoder processes");
        }
        killed
    }

    /// Poll the process table until no transcoder process remains, up to
    /// `max` total wait
    ///
    /// Returns false on timeout; the caller issues one more sweep and
    /// logs a warning, never a hard failure.
    pub async fn wait_for_name_absence(&self, poll: Duration, max: Duration) -> bool {
        let target = executable_name(&self.program);
        let deadline = Instant::now() + max;
        let mut system = System::new();

        loop {
            system.refresh_processes();
            let alive = system
                .processes()
                .values()
                .any(|p| name_matches(p.name(), &target));
            if !alive {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(poll).await;
        }
    }
}

/// Bare executable name of a possibly path-qualified program
fn executable_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string())
}

/// Process-table name match, tolerant of the windows `.exe` suffix
fn name_matches(process_name: &str, target: &str) -> bool {
    process_name.eq_ignore_ascii_case(target)
        || process_name
            .strip_suffix(".exe")
            .map(|stem| stem.eq_ignore_ascii_case(target))
            .unwrap_or(false)
}

#[cfg(unix)]
mod platform {
    use super::KILL_ESCALATION_PAUSE;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;
    use tokio::time::sleep;
    use tracing::{debug, warn};

    /// Cooperative terminate: SIGTERM to the process itself
    pub async fn request_terminate(pid: u32) {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!(pid, "SIGTERM failed (process may already be gone): {}", e);
        }
    }

    /// Kill the whole process group: SIGTERM, short pause, SIGKILL
    pub async fn kill_tree(pid: u32, child: &mut tokio::process::Child) {
        let pgid = Pid::from_raw(pid as i32);

        match killpg(pgid, Signal::SIGTERM) {
            Ok(_) => debug!(pid, "Sent SIGTERM to process group"),
            Err(e) => {
                warn!(pid, "SIGTERM to process group failed: {}", e);
                let _ = child.start_kill();
            }
        }

        sleep(KILL_ESCALATION_PAUSE).await;

        match killpg(pgid, Signal::SIGKILL) {
            Ok(_) => debug!(pid, "Sent SIGKILL to process group"),
            Err(e) => {
                // ESRCH here just means the group is already gone
                debug!(pid, "SIGKILL to process group failed: {}", e);
                let _ = child.start_kill();
            }
        }
    }
}

#[cfg(windows)]
mod platform {
    use tracing::{debug, warn};

    /// Cooperative terminate: taskkill without /F posts a close request
    pub async fn request_terminate(pid: u32) {
        run_taskkill(&["/PID", &pid.to_string()]).await;
    }

    /// Force-kill the process and its whole tree
    pub async fn kill_tree(pid: u32, child: &mut tokio::process::Child) {
        run_taskkill(&["/F", "/T", "/PID", &pid.to_string()]).await;
        let _ = child.start_kill();
    }

    async fn run_taskkill(args: &[&str]) {
        match tokio::process::Command::new("taskkill")
            .args(args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .output()
            .await
        {
            Ok(output) => debug!(?args, code = ?output.status.code(), "taskkill finished"),
            Err(e) => warn!(?args, "taskkill failed to run: {}", e),
        }
    }
}
