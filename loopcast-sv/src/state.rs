//! Shared supervisor state
//!
//! Thread-safe state for coordination between the supervisor task and the
//! control surface. The supervisor task is the only writer; handlers and
//! SSE subscribers only read.

use loopcast_common::{time, LoopcastEvent, SupervisorStatus};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// State accessible by all components
pub struct SharedState {
    /// Current supervisor status
    status: RwLock<SupervisorStatus>,

    /// Item currently being streamed (None outside Running)
    current_item: RwLock<Option<String>>,

    /// Active session id (None when Idle)
    session_id: RwLock<Option<Uuid>>,

    /// Spawn attempts of the current session; backoff/display only
    restart_count: AtomicU32,

    /// Event broadcaster for SSE subscribers
    event_tx: broadcast::Sender<LoopcastEvent>,
}

impl SharedState {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            status: RwLock::new(SupervisorStatus::Idle),
            current_item: RwLock::new(None),
            session_id: RwLock::new(None),
            restart_count: AtomicU32::new(0),
            event_tx,
        }
    }

    /// Broadcast an event to all SSE listeners
    ///
    /// Send errors (no receivers) are ignored.
    pub fn broadcast_event(&self, event: LoopcastEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to the event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<LoopcastEvent> {
        self.event_tx.subscribe()
    }

    pub async fn status(&self) -> SupervisorStatus {
        *self.status.read().await
    }

    /// Set the status and broadcast the transition
    pub async fn set_status(&self, new_status: SupervisorStatus) {
        let old_status = {
            let mut guard = self.status.write().await;
            std::mem::replace(&mut *guard, new_status)
        };
        if old_status != new_status {
            self.broadcast_event(LoopcastEvent::StatusChanged {
                old_status,
                new_status,
                timestamp: time::now(),
            });
        }
    }

    pub async fn current_item(&self) -> Option<String> {
        self.current_item.read().await.clone()
    }

    pub async fn set_current_item(&self, item: Option<String>) {
        *self.current_item.write().await = item;
    }

    pub async fn session_id(&self) -> Option<Uuid> {
        *self.session_id.read().await
    }

    pub async fn set_session_id(&self, id: Option<Uuid>) {
        *self.session_id.write().await = id;
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count.load(Ordering::Relaxed)
    }

    /// Record one spawn attempt, returning the attempt number
    pub fn increment_restart_count(&self) -> u32 {
        self.restart_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Reset the spawn counter; called only on a fresh start
    pub fn reset_restart_count(&self) {
        self.restart_count.store(0, Ordering::Relaxed);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
