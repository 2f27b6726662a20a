//! Supervisor state-machine integration tests
//!
//! Drives the supervisor against stub transcoder scripts instead of a real
//! encoder. Each test uses a uniquely named stub so the name-based sweep in
//! the stop sequence can never touch another test's processes.

#![cfg(unix)]

use loopcast_common::config::SessionSettings;
use loopcast_common::{LoopcastEvent, SupervisorStatus};
use loopcast_sv::session_log::SessionLog;
use loopcast_sv::supervisor::EncodingProfile;
use loopcast_sv::{SharedState, StreamSupervisor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::timeout;

static STUB_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Write an executable stub transcoder with a short, unique name
fn write_stub(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let n = STUB_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = format!("lc{}-{}", std::process::id() % 10_000, n);
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

struct Harness {
    dir: TempDir,
    supervisor: Arc<StreamSupervisor>,
    state: Arc<SharedState>,
}

impl Harness {
    fn new(transcoder: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(SessionLog::open(&dir.path().join("stream.log")).unwrap());
        let state = Arc::new(SharedState::new());
        let supervisor = Arc::new(StreamSupervisor::new(
            transcoder,
            Arc::clone(&state),
            log,
        ));
        Self {
            dir,
            supervisor,
            state,
        }
    }

    fn media_file(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::File::create(&path).unwrap();
        path
    }

    fn media_folder(&self, names: &[&str]) -> PathBuf {
        let folder = self.dir.path().join("media");
        std::fs::create_dir_all(&folder).unwrap();
        for name in names {
            std::fs::File::create(folder.join(name)).unwrap();
        }
        folder
    }

    fn settings_for(&self, source: &Path) -> SessionSettings {
        SessionSettings {
            source: source.to_string_lossy().into_owned(),
            endpoint_base: "rtmp://127.0.0.1/live/".to_string(),
            stream_key: "test-key".to_string(),
        }
    }
}

async fn next_item_started(rx: &mut broadcast::Receiver<LoopcastEvent>) -> String {
    loop {
        let event = timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for ItemStarted")
            .expect("event channel closed");
        if let LoopcastEvent::ItemStarted { item, .. } = event {
            return item;
        }
    }
}

async fn wait_for_status(state: &SharedState, wanted: SupervisorStatus, max: Duration) {
    let deadline = tokio::time::Instant::now() + max;
    loop {
        if state.status().await == wanted {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "status never reached {:?}, still {:?}",
            wanted,
            state.status().await
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test]
async fn empty_stream_key_is_rejected_and_status_stays_idle() {
    let harness = Harness::new("ffmpeg");
    let file = harness.media_file("clip.mp4");

    let mut settings = harness.settings_for(&file);
    settings.stream_key = String::new();

    let err = harness
        .supervisor
        .start(&settings, EncodingProfile::default())
        .await
        .unwrap_err();
    assert!(matches!(err, loopcast_common::Error::Validation(_)));
    assert_eq!(harness.state.status().await, SupervisorStatus::Idle);
    assert_eq!(harness.state.restart_count(), 0);
}

#[tokio::test]
async fn nonexistent_source_is_rejected() {
    let harness = Harness::new("ffmpeg");

    let settings = SessionSettings {
        source: "/no/such/media/path".to_string(),
        endpoint_base: "rtmp://127.0.0.1/live/".to_string(),
        stream_key: "test-key".to_string(),
    };

    let err = harness
        .supervisor
        .start(&settings, EncodingProfile::default())
        .await
        .unwrap_err();
    assert!(matches!(err, loopcast_common::Error::Validation(_)));
    assert_eq!(harness.state.status().await, SupervisorStatus::Idle);
}

#[tokio::test]
async fn folder_pass_visits_items_in_sorted_order_then_rescans() {
    let dir = TempDir::new().unwrap();
    let stub = write_stub(dir.path(), "exit 0");

    let harness = Harness::new(stub.to_str().unwrap());
    let folder = harness.media_folder(&["b.mp4", "a.mp4"]);
    let settings = harness.settings_for(&folder);

    let mut rx = harness.state.subscribe_events();
    harness
        .supervisor
        .start(&settings, EncodingProfile::default())
        .await
        .unwrap();

    let first = next_item_started(&mut rx).await;
    let second = next_item_started(&mut rx).await;
    // Third start means the pass wrapped and a fresh scan began
    let third = next_item_started(&mut rx).await;

    assert!(first.ends_with("a.mp4"), "first item was {}", first);
    assert!(second.ends_with("b.mp4"), "second item was {}", second);
    assert!(third.ends_with("a.mp4"), "wrap item was {}", third);

    harness.supervisor.stop().await;
    wait_for_status(&harness.state, SupervisorStatus::Idle, Duration::from_secs(20)).await;
}

#[tokio::test]
async fn single_file_exit_schedules_restart_with_increasing_attempts() {
    let dir = TempDir::new().unwrap();
    let stub = write_stub(dir.path(), "exit 1");

    let harness = Harness::new(stub.to_str().unwrap());
    let file = harness.media_file("clip.mp4");
    let settings = harness.settings_for(&file);

    let mut rx = harness.state.subscribe_events();
    harness
        .supervisor
        .start(&settings, EncodingProfile::Horizontal1080)
        .await
        .unwrap();

    let mut saw_restart = None;
    for _ in 0..20 {
        let event = timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for RestartScheduled")
            .expect("event channel closed");
        if let LoopcastEvent::RestartScheduled { attempt, .. } = event {
            saw_restart = Some(attempt);
            break;
        }
    }
    // First spawn was attempt 1; the scheduled restart becomes attempt 2
    assert_eq!(saw_restart, Some(2));
    assert_eq!(harness.state.restart_count(), 1);

    harness.supervisor.stop().await;
    wait_for_status(&harness.state, SupervisorStatus::Idle, Duration::from_secs(20)).await;
}

#[tokio::test]
async fn stop_during_backoff_is_honored_promptly() {
    let dir = TempDir::new().unwrap();
    let stub = write_stub(dir.path(), "exit 1");

    let harness = Harness::new(stub.to_str().unwrap());
    let file = harness.media_file("clip.mp4");
    let settings = harness.settings_for(&file);

    let mut rx = harness.state.subscribe_events();
    harness
        .supervisor
        .start(&settings, EncodingProfile::default())
        .await
        .unwrap();

    // Wait until the session is inside the restart backoff
    loop {
        let event = timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for RestartScheduled")
            .expect("event channel closed");
        if matches!(event, LoopcastEvent::RestartScheduled { .. }) {
            break;
        }
    }

    harness.supervisor.stop().await;
    // Well under the 5s backoff: the sleep is chunked and observes the flag
    wait_for_status(&harness.state, SupervisorStatus::Idle, Duration::from_secs(20)).await;
}

#[tokio::test]
async fn stop_prevents_any_further_spawn() {
    let dir = TempDir::new().unwrap();
    let stub = write_stub(dir.path(), "sleep 30");

    let harness = Harness::new(stub.to_str().unwrap());
    let folder = harness.media_folder(&["a.mp4", "b.mp4"]);
    let settings = harness.settings_for(&folder);

    let mut rx = harness.state.subscribe_events();
    harness
        .supervisor
        .start(&settings, EncodingProfile::default())
        .await
        .unwrap();

    let first = next_item_started(&mut rx).await;
    assert!(first.ends_with("a.mp4"));

    harness.supervisor.stop().await;
    wait_for_status(&harness.state, SupervisorStatus::Idle, Duration::from_secs(25)).await;

    // Exactly one spawn happened; the stop left nothing to advance to
    assert_eq!(harness.state.restart_count(), 1);
    while let Ok(event) = rx.try_recv() {
        assert!(
            !matches!(event, LoopcastEvent::ItemStarted { .. }),
            "spawn occurred after stop"
        );
    }
}

#[tokio::test]
async fn stop_is_idempotent_when_idle() {
    let harness = Harness::new("ffmpeg");
    harness.supervisor.stop().await;
    harness.supervisor.stop().await;
    assert_eq!(harness.state.status().await, SupervisorStatus::Idle);
}

#[tokio::test]
async fn missing_transcoder_is_fatal_and_returns_to_idle() {
    let harness = Harness::new("/nonexistent/loopcast-fatal-bin");
    let file = harness.media_file("clip.mp4");
    let settings = harness.settings_for(&file);

    let mut rx = harness.state.subscribe_events();
    harness
        .supervisor
        .start(&settings, EncodingProfile::default())
        .await
        .unwrap();

    let mut saw_fatal = false;
    for _ in 0..20 {
        let event = timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for FatalError")
            .expect("event channel closed");
        match event {
            LoopcastEvent::FatalError { .. } => {
                saw_fatal = true;
                break;
            }
            LoopcastEvent::RestartScheduled { .. } => {
                panic!("fatal spawn error must not trigger a restart");
            }
            _ => {}
        }
    }
    assert!(saw_fatal);
    wait_for_status(&harness.state, SupervisorStatus::Idle, Duration::from_secs(20)).await;
}

#[tokio::test]
async fn second_start_while_active_is_rejected() {
    let dir = TempDir::new().unwrap();
    let stub = write_stub(dir.path(), "sleep 30");

    let harness = Harness::new(stub.to_str().unwrap());
    let file = harness.media_file("clip.mp4");
    let settings = harness.settings_for(&file);

    let mut rx = harness.state.subscribe_events();
    harness
        .supervisor
        .start(&settings, EncodingProfile::default())
        .await
        .unwrap();
    next_item_started(&mut rx).await;

    let err = harness
        .supervisor
        .start(&settings, EncodingProfile::default())
        .await
        .unwrap_err();
    assert!(matches!(err, loopcast_common::Error::SessionActive));

    harness.supervisor.stop().await;
    wait_for_status(&harness.state, SupervisorStatus::Idle, Duration::from_secs(25)).await;
}

#[tokio::test]
async fn restart_counter_resets_on_fresh_start() {
    let dir = TempDir::new().unwrap();
    let stub = write_stub(dir.path(), "exit 0");

    let harness = Harness::new(stub.to_str().unwrap());
    let folder = harness.media_folder(&["a.mp4", "b.mp4"]);
    let settings = harness.settings_for(&folder);

    let mut rx = harness.state.subscribe_events();
    harness
        .supervisor
        .start(&settings, EncodingProfile::default())
        .await
        .unwrap();

    // Two quick items push the spawn counter to at least 2
    next_item_started(&mut rx).await;
    next_item_started(&mut rx).await;
    assert!(harness.state.restart_count() >= 2);

    harness.supervisor.stop().await;
    wait_for_status(&harness.state, SupervisorStatus::Idle, Duration::from_secs(20)).await;

    let mut rx = harness.state.subscribe_events();
    harness
        .supervisor
        .start(&settings, EncodingProfile::default())
        .await
        .unwrap();
    next_item_started(&mut rx).await;
    assert_eq!(harness.state.restart_count(), 1);

    harness.supervisor.stop().await;
    wait_for_status(&harness.state, SupervisorStatus::Idle, Duration::from_secs(20)).await;
}
