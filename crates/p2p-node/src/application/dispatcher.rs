//! Event dispatcher: turns radio notifications into session updates, gate
//! signals, and user events.
//!
//! # Ordering
//!
//! Notifications are handled one at a time on a single task.  For each one:
//!
//! 1. the session is updated under a short lock,
//! 2. the lock is released and a snapshot taken,
//! 3. gates are signalled and events forwarded using that snapshot.
//!
//! Signalling after the update means that when the orchestrator wakes from
//! a gate, the session fields behind that gate are already written.
//!
//! Handlers never block: link flag changes are quick synchronous calls and
//! sinks are required not to block either.

use std::sync::{Arc, Mutex, PoisonError};

use p2p_core::{P2pEvent, P2pRole, P2pState, SessionContext};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::events::EventSinks;
use super::gates::{GateKind, GateSet};
use super::ports::{LinkError, LinkLayer, RadioNotification};

// ── Shared session handle ─────────────────────────────────────────────────────

/// Cloneable handle to the node's single [`SessionContext`].
///
/// The lock is a `std::sync::Mutex` and is only ever held inside
/// [`SharedSession::update`] / [`SharedSession::snapshot`], never across an
/// `.await`.
#[derive(Clone)]
pub struct SharedSession(Arc<Mutex<SessionContext>>);

impl SharedSession {
    pub fn new(max_peers: usize) -> Self {
        Self(Arc::new(Mutex::new(SessionContext::new(max_peers))))
    }

    /// A copy of the current session.
    pub fn snapshot(&self) -> SessionContext {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Runs `f` with exclusive access to the session.
    pub fn update<R>(&self, f: impl FnOnce(&mut SessionContext) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn state(&self) -> P2pState {
        self.update(|ctx| ctx.state)
    }

    pub fn role(&self) -> P2pRole {
        self.update(|ctx| ctx.role)
    }
}

// ── Link activation ───────────────────────────────────────────────────────────

/// Brings the P2P interface to a state where it can send negotiation frames:
/// admin up, carrier on, dormant off.
///
/// "Already up" is expected and ignored; other failures are logged and the
/// sequence continues.
pub fn activate_link(link: &dyn LinkLayer) {
    match link.set_admin_up() {
        Ok(()) | Err(LinkError::AlreadyUp) => {}
        Err(e) => warn!("failed to bring P2P interface up: {e}"),
    }
    if let Err(e) = link.carrier_on() {
        warn!("failed to turn carrier on: {e}");
    }
    if let Err(e) = link.dormant_off() {
        warn!("failed to clear dormant flag: {e}");
    }
    debug!("P2P interface activated");
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Side effects collected under the session lock and applied after it.
#[derive(Default)]
struct Effects {
    /// Events and gate signals in the order they must happen.
    steps: Vec<Step>,
    activate_link: bool,
}

enum Step {
    Emit(P2pEvent),
    Signal(GateKind),
}

impl Effects {
    fn emit(&mut self, event: P2pEvent) -> &mut Self {
        self.steps.push(Step::Emit(event));
        self
    }

    fn signal(&mut self, gate: GateKind) -> &mut Self {
        self.steps.push(Step::Signal(gate));
        self
    }
}

/// Consumes [`RadioNotification`]s and keeps the session, gates, and sinks in
/// step with them.
pub struct EventDispatcher {
    session: SharedSession,
    gates: Arc<GateSet>,
    sinks: Arc<EventSinks>,
    link: Arc<dyn LinkLayer>,
}

impl EventDispatcher {
    pub fn new(
        session: SharedSession,
        gates: Arc<GateSet>,
        sinks: Arc<EventSinks>,
        link: Arc<dyn LinkLayer>,
    ) -> Self {
        Self {
            session,
            gates,
            sinks,
            link,
        }
    }

    /// Spawns the dispatcher task.  It runs until every sender of `rx` is
    /// dropped.
    pub fn spawn(self: Arc<Self>, mut rx: mpsc::Receiver<RadioNotification>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                self.handle(notification);
            }
            debug!("radio notification channel closed; dispatcher stopped");
        })
    }

    /// Handles one notification.
    pub fn handle(&self, notification: RadioNotification) {
        debug!("radio notification: {notification:?}");
        let effects = self.session.update(|ctx| Self::apply(ctx, notification));

        if effects.activate_link {
            activate_link(self.link.as_ref());
        }
        if effects.steps.is_empty() {
            return;
        }

        let snapshot = self.session.snapshot();
        for step in effects.steps {
            match step {
                Step::Emit(event) => self.sinks.emit(event, &snapshot),
                Step::Signal(gate) => self.gates.signal(gate),
            }
        }
    }

    /// Session mutation for one notification.  Runs under the session lock.
    fn apply(ctx: &mut SessionContext, notification: RadioNotification) -> Effects {
        let mut fx = Effects::default();

        match notification {
            RadioNotification::DeviceFound(peer) => {
                info!("P2P device found: {} ({}, {} dBm)", peer.name, peer.mac, peer.rssi);
                ctx.record_device_found(peer);
                fx.signal(GateKind::PeerFound).emit(P2pEvent::DeviceFound);
            }

            RadioNotification::ConnectResult { status: 0 } => {
                if ctx.role == P2pRole::GroupOwner {
                    fx.emit(P2pEvent::PeerJoined);
                } else {
                    ctx.role = P2pRole::Client;
                    fx.emit(P2pEvent::Connected);
                }
                ctx.transition(P2pState::Connected);
                ctx.connected = true;
                ctx.group_formed = true;
                fx.signal(GateKind::Connected).signal(GateKind::GroupFormed);
            }

            RadioNotification::ConnectResult { status } => {
                if ctx.state == P2pState::Connecting {
                    // Reported mid-negotiation even when the handshake goes on
                    // to succeed.
                    warn!("transient connect failure (status {status}) during negotiation; ignoring");
                } else {
                    warn!("P2P connection failed (status {status}) in state {}", ctx.state);
                    ctx.transition(P2pState::Error);
                    fx.emit(P2pEvent::ConnectFailed)
                        .signal(GateKind::Connected)
                        .signal(GateKind::GroupFormed);
                }
            }

            RadioNotification::ApEnableResult { status: 0 } => {
                ctx.role = P2pRole::GroupOwner;
                ctx.group_formed = true;
                ctx.connected = true;
                ctx.transition(P2pState::GroupFormed);
                fx.activate_link = true;
                fx.signal(GateKind::GroupFormed).emit(P2pEvent::GroupStarted);
            }

            RadioNotification::ApEnableResult { status } => {
                warn!("group owner enable failed (status {status})");
                ctx.transition(P2pState::Error);
                fx.signal(GateKind::GroupFormed).emit(P2pEvent::ConnectFailed);
            }

            RadioNotification::ApStaConnected { mac } => {
                info!("station {mac} connected to our group");
                ctx.connected = true;
                ctx.peer_address = mac;
                fx.emit(P2pEvent::PeerJoined)
                    .signal(GateKind::ApStaConnected)
                    .emit(P2pEvent::ApStationConnected);
            }

            RadioNotification::ApStaDisconnected { mac } => {
                if mac == ctx.peer_address {
                    info!("station {mac} left our group");
                    ctx.connected = false;
                    ctx.clear_peer();
                    fx.emit(P2pEvent::PeerLeft);
                } else {
                    debug!("ignoring disconnect of untracked station {mac}");
                }
            }

            RadioNotification::NegotiationRequest { mac } => {
                info!("GO negotiation request from {mac}");
                fx.signal(GateKind::NegotiationRequest);
            }

            RadioNotification::Disconnected => {
                ctx.group_removed();
                fx.emit(P2pEvent::Disconnected);
            }
        }

        fx
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
