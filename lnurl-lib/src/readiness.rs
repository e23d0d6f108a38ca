//! Startup readiness gate.
//!
//! The engine must not serve protocol traffic until its store (and backend, if
//! configured) have finished initializing. Requests arriving earlier park on
//! the gate and are released in arrival order once a single "ready" signal is
//! latched. A failure signal is latched permanently: every parked and future
//! request fails rather than retrying initialization per request.

use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::{LnurlError, Result};

enum GateState {
    Pending(Vec<oneshot::Sender<std::result::Result<(), String>>>),
    Ready,
    Failed(String),
}

/// Latched readiness signal with FIFO waiter release.
pub struct ReadinessGate {
    state: Mutex<GateState>,
}

impl ReadinessGate {
    /// A gate that is not yet ready; waiters park until a signal is latched.
    pub fn pending() -> Self {
        Self {
            state: Mutex::new(GateState::Pending(Vec::new())),
        }
    }

    /// A gate that is ready from the start (synchronous initialization).
    pub fn ready() -> Self {
        Self {
            state: Mutex::new(GateState::Ready),
        }
    }

    /// Latch success and release parked waiters in arrival order.
    ///
    /// A no-op if a signal was already latched.
    pub fn set_ready(&self) {
        let waiters = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match std::mem::replace(&mut *state, GateState::Ready) {
                GateState::Pending(waiters) => waiters,
                previous => {
                    *state = previous;
                    return;
                }
            }
        };
        tracing::debug!(waiters = waiters.len(), "engine ready");
        for waiter in waiters {
            let _ = waiter.send(Ok(()));
        }
    }

    /// Latch failure; parked and future waiters all fail with `reason`.
    pub fn set_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let waiters = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match std::mem::replace(&mut *state, GateState::Failed(reason.clone())) {
                GateState::Pending(waiters) => waiters,
                previous => {
                    *state = previous;
                    return;
                }
            }
        };
        tracing::error!(%reason, waiters = waiters.len(), "engine initialization failed");
        for waiter in waiters {
            let _ = waiter.send(Err(reason.clone()));
        }
    }

    /// Wait for the latched signal.
    pub async fn wait(&self) -> Result<()> {
        let receiver = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match &mut *state {
                GateState::Ready => return Ok(()),
                GateState::Failed(reason) => return Err(LnurlError::Unavailable(reason.clone())),
                GateState::Pending(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
            }
        };
        match receiver.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(LnurlError::Unavailable(reason)),
            Err(_) => Err(LnurlError::Unavailable("engine shut down".into())),
        }
    }

    /// Whether the gate has latched success.
    pub fn is_ready(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        matches!(*state, GateState::Ready)
    }
}
