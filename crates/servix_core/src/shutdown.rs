//! Process-wide shutdown state machine.
//!
//! The controller owns the state (Running -> Draining -> Stopped) and
//! broadcasts transitions over a watch channel. The master accept loop
//! and the per-connection workers each hold a [`ShutdownSignal`] and
//! observe the transition cooperatively: the accept loop stops pulling
//! new connections, workers finish their current exchange and close.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Accepting and serving connections.
    Running,
    /// No longer accepting; in-flight handlers are finishing.
    Draining,
    /// All handlers finished or the grace period expired.
    Stopped,
}

#[derive(Clone)]
pub struct ShutdownController {
    tx: Arc<watch::Sender<ShutdownState>>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ShutdownState::Running);
        Self { tx: Arc::new(tx) }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.tx.borrow()
    }

    /// Running -> Draining. A second call is a no-op.
    pub fn begin_drain(&self) {
        self.tx.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                info!(target: "servix::shutdown", "Draining: no new connections will be accepted");
                *state = ShutdownState::Draining;
                true
            } else {
                false
            }
        });
    }

    /// Draining -> Stopped. Ignored unless draining.
    pub fn mark_stopped(&self) {
        self.tx.send_if_modified(|state| {
            if *state == ShutdownState::Draining {
                *state = ShutdownState::Stopped;
                true
            } else {
                false
            }
        });
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the shutdown state, cloned into every task.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<ShutdownState>,
}

impl ShutdownSignal {
    pub fn is_draining(&self) -> bool {
        *self.rx.borrow() != ShutdownState::Running
    }

    /// Resolve once the server has left the Running state.
    pub async fn draining(&mut self) {
        // Err means the controller is gone, which only happens on
        // teardown; treat it as a shutdown too.
        let _ = self
            .rx
            .wait_for(|state| *state != ShutdownState::Running)
            .await;
    }
}
