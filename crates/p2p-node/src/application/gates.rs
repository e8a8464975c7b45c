//! Synchronization gates.
//!
//! Radio notifications arrive whenever the radio feels like it, possibly
//! before the orchestrator has started waiting for them.  A [`Gate`] turns
//! such a notification into something the sequential pairing code can
//! `await` with a timeout.
//!
//! # Semantics
//!
//! - `signal()` releases exactly one waiter.  With nobody waiting, the signal
//!   is latched and the next `wait()` returns immediately.
//! - `reset()` drops a latched signal.  The orchestrator resets a gate right
//!   before the step that waits on it, so a stale signal from an earlier
//!   attempt can never satisfy a new wait.
//! - `wait(timeout)` returns `Err(GateError::Timeout)` after the full timeout
//!   when no signal arrives.  It never returns early.
//!
//! # How it works (for beginners)
//!
//! `tokio::sync::Notify` wakes sleeping tasks but does not remember *how
//! many* signals there were once a waiter consumed one.  The latched flag is
//! the actual one-shot state; `Notify` only tells waiters to go and look at
//! it.  Waiters register with `Notify` *before* checking the flag, so a
//! signal that lands between the check and the sleep is not lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::{self, Instant};

/// Returned by [`Gate::wait`] when no signal arrived in time.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    #[error("timed out waiting for signal")]
    Timeout,
}

/// A resettable, latching, one-shot signal with a timed wait.
#[derive(Debug, Default)]
pub struct Gate {
    signalled: AtomicBool,
    notify: Notify,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases one waiter, or latches the signal when nobody is waiting.
    pub fn signal(&self) {
        self.signalled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Clears a pending signal.
    pub fn reset(&self) {
        self.signalled.store(false, Ordering::SeqCst);
    }

    /// Whether a signal is latched and not yet consumed.
    pub fn is_signalled(&self) -> bool {
        self.signalled.load(Ordering::SeqCst)
    }

    fn take(&self) -> bool {
        self.signalled.swap(false, Ordering::SeqCst)
    }

    /// Waits until signalled or until `timeout` has fully elapsed.
    pub async fn wait(&self, timeout: Duration) -> Result<(), GateError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.take() {
                return Ok(());
            }

            if time::timeout_at(deadline, notified).await.is_err() {
                // A signal racing the deadline still counts.
                return if self.take() {
                    Ok(())
                } else {
                    Err(GateError::Timeout)
                };
            }
            // Woken: another waiter may have taken the signal first, loop.
        }
    }
}

/// Identifies one of the five gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    PeerFound,
    Connected,
    GroupFormed,
    NegotiationRequest,
    ApStaConnected,
}

/// The five gates shared by the dispatcher and the orchestrator.
#[derive(Debug, Default)]
pub struct GateSet {
    pub peer_found: Gate,
    pub connected: Gate,
    pub group_formed: Gate,
    pub negotiation_request: Gate,
    pub ap_sta_connected: Gate,
}

impl GateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: GateKind) -> &Gate {
        match kind {
            GateKind::PeerFound => &self.peer_found,
            GateKind::Connected => &self.connected,
            GateKind::GroupFormed => &self.group_formed,
            GateKind::NegotiationRequest => &self.negotiation_request,
            GateKind::ApStaConnected => &self.ap_sta_connected,
        }
    }

    pub fn signal(&self, kind: GateKind) {
        self.get(kind).signal();
    }

    /// Clears every pending signal.  Used on (re)initialization.
    pub fn reset_all(&self) {
        self.peer_found.reset();
        self.connected.reset();
        self.group_formed.reset();
        self.negotiation_request.reset();
        self.ap_sta_connected.reset();
    }

    /// Clears the gates a connect attempt waits on.
    pub fn reset_connect_gates(&self) {
        self.connected.reset();
        self.group_formed.reset();
        self.ap_sta_connected.reset();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
