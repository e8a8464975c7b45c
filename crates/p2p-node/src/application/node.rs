//! `P2pNode`: the facade `main.rs` and the integration tests talk to.
//!
//! It owns the session handle, the gates, the event sinks, the dispatcher,
//! and the orchestrator, and maps user commands onto them.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use p2p_core::{EchoStats, P2pEvent, SessionContext};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::commands::NodeCommand;
use super::dispatcher::{EventDispatcher, SharedSession};
use super::events::{EventSinks, LoggingSink, P2pEventSink};
use super::gates::GateSet;
use super::orchestrator::{
    PairingConfig, PairingError, PairingOrchestrator, PairingOutcome, PairingPorts,
};
use super::ports::{EchoService, RadioNotification};

/// Point-in-time view of the node.
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub session: SessionContext,
    pub echo: EchoStats,
    pub echo_running: bool,
    pub pairing_in_flight: bool,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.session)?;
        if self.echo_running || self.echo.packets_sent > 0 || self.echo.packets_received > 0 {
            write!(f, "\n{}", self.echo)?;
        }
        Ok(())
    }
}

/// What a command did.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    /// A pairing attempt was started in the background.
    PairingStarted,
    /// Already connected: the current echo statistics.
    Stats(EchoStats),
    /// Echo stopped; `None` when nothing was running.
    EchoStopped(Option<EchoStats>),
    Status(NodeStatus),
    Left,
}

/// Stops the echo session when the peer goes away, including one that is
/// still waiting for the client's address binding.
struct EchoTeardown {
    orchestrator: Arc<PairingOrchestrator>,
    echo: Arc<dyn EchoService>,
}

impl P2pEventSink for EchoTeardown {
    fn on_event(&self, event: P2pEvent, _ctx: &SessionContext) {
        if !matches!(event, P2pEvent::PeerLeft | P2pEvent::Disconnected) {
            return;
        }
        if self.orchestrator.abort_follow_up() {
            info!("{event}; cancelled pending echo client start");
        }
        if !self.echo.is_running() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no runtime available to stop echo after {event}");
            return;
        };
        let echo = Arc::clone(&self.echo);
        info!("{event}; stopping UDP echo");
        runtime.spawn(async move {
            if let Some(stats) = echo.stop().await {
                info!("{stats}");
            }
        });
    }
}

/// One Wi-Fi Direct node.
pub struct P2pNode {
    session: SharedSession,
    sinks: Arc<EventSinks>,
    dispatcher: Arc<EventDispatcher>,
    orchestrator: Arc<PairingOrchestrator>,
    echo: Arc<dyn EchoService>,
    pairing_task: Mutex<Option<JoinHandle<()>>>,
}

impl P2pNode {
    pub fn new(config: PairingConfig, ports: PairingPorts) -> Arc<Self> {
        let session = SharedSession::new(config.max_peers);
        let gates = Arc::new(GateSet::new());

        let echo = Arc::clone(&ports.echo);
        let link = Arc::clone(&ports.link);
        let orchestrator = Arc::new(PairingOrchestrator::new(
            config,
            session.clone(),
            Arc::clone(&gates),
            ports,
        ));

        let sinks = Arc::new(EventSinks::new());
        sinks.register(Arc::new(LoggingSink));
        sinks.register(Arc::new(EchoTeardown {
            orchestrator: Arc::clone(&orchestrator),
            echo: Arc::clone(&echo),
        }));

        let dispatcher = Arc::new(EventDispatcher::new(
            session.clone(),
            gates,
            Arc::clone(&sinks),
            link,
        ));

        Arc::new(Self {
            session,
            sinks,
            dispatcher,
            orchestrator,
            echo,
            pairing_task: Mutex::new(None),
        })
    }

    /// Initializes the session and starts consuming radio notifications.
    pub fn start(&self, notifications: mpsc::Receiver<RadioNotification>) -> JoinHandle<()> {
        self.orchestrator.initialize();
        Arc::clone(&self.dispatcher).spawn(notifications)
    }

    /// Adds a user-facing event sink.
    pub fn register_sink(&self, sink: Arc<dyn P2pEventSink>) {
        self.sinks.register(sink);
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn orchestrator(&self) -> &Arc<PairingOrchestrator> {
        &self.orchestrator
    }

    /// Runs a pairing attempt on the caller's task.
    pub async fn pair(&self) -> Result<PairingOutcome, PairingError> {
        self.orchestrator.start_pairing().await
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            session: self.session.snapshot(),
            echo: self.echo.stats(),
            echo_running: self.echo.is_running(),
            pairing_in_flight: self.orchestrator.is_in_flight(),
        }
    }

    pub async fn handle_command(
        self: &Arc<Self>,
        command: NodeCommand,
    ) -> Result<CommandOutcome, PairingError> {
        match command {
            NodeCommand::Pair => {
                if self.session.snapshot().connected {
                    let stats = self.echo.stats();
                    info!("{stats}");
                    return Ok(CommandOutcome::Stats(stats));
                }
                if self.orchestrator.is_in_flight() {
                    warn!("pairing already in progress");
                    return Err(PairingError::AlreadyInProgress);
                }
                self.spawn_pairing();
                Ok(CommandOutcome::PairingStarted)
            }
            NodeCommand::StopEcho => {
                let stats = self.echo.stop().await;
                match &stats {
                    Some(stats) => info!("{stats}"),
                    None => info!("UDP echo is not running"),
                }
                Ok(CommandOutcome::EchoStopped(stats))
            }
            NodeCommand::Status => {
                let status = self.status();
                info!("{status}");
                Ok(CommandOutcome::Status(status))
            }
            NodeCommand::Leave => {
                self.orchestrator.leave_group().await?;
                Ok(CommandOutcome::Left)
            }
        }
    }

    fn spawn_pairing(self: &Arc<Self>) {
        let node = Arc::clone(self);
        let handle = tokio::spawn(async move {
            match node.pair().await {
                Ok(outcome) => info!("pairing finished: {outcome:?}"),
                Err(e) => error!("pairing failed ({:?}): {e}", e.class()),
            }
        });
        // A previous handle belongs to a finished attempt; dropping it detaches.
        *self
            .pairing_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Waits for the background pairing attempt started by
    /// [`NodeCommand::Pair`], if any.
    pub async fn wait_for_pairing(&self) {
        let handle = self
            .pairing_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("pairing task ended abnormally: {e}");
            }
        }
    }

    /// Cancels a running attempt and stops echo.
    pub async fn shutdown(&self) {
        let handle = self
            .pairing_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.orchestrator.abort_follow_up();
        if let Some(stats) = self.echo.stop().await {
            info!("{stats}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
