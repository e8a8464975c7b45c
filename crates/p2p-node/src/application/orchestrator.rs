//! Pairing orchestrator: discovery, peer selection, connect, and post-connect
//! setup for one pairing attempt.
//!
//! # Sequence (for beginners)
//!
//! ```text
//! start_pairing()
//!  ├─ discovery for a fixed window
//!  ├─ stop discovery, pick a peer (MAC filter or strongest RSSI)
//!  ├─ intent 0 only: give the peer a moment to send its negotiation request
//!  ├─ connect and wait for the "group formed" gate
//!  └─ role?
//!       ├─ GroupOwner: wait for the station, static IP, address pool, echo server
//!       └─ Client:     request an address; once bound, start the echo client
//! ```
//!
//! Several steps are plain sleeps.  They exist because the radio needs time
//! between operations it does not report on (discovery actually stopping,
//! the 4-way handshake finishing).  They are configured, not hard-coded.
//!
//! # One attempt at a time
//!
//! An [`InFlightGuard`] is taken at the top of every trigger.  It clears the
//! in-flight flag when dropped, so early returns and `?` cannot leave the
//! orchestrator stuck.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use p2p_core::{
    select_peer, DiscoveredPeer, GoIntent, MacAddress, P2pRole, P2pState, PeerFilter,
    SelectionError,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::dispatcher::{activate_link, SharedSession};
use super::gates::GateSet;
use super::ports::{EchoService, LinkLayer, NetworkConfigurator, RadioError, RadioManager};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Timing and addressing parameters of a pairing attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingConfig {
    /// Name of the P2P network interface.
    pub interface: String,
    /// How long the radio keeps discovering once started.
    pub discovery_timeout: Duration,
    /// How long we let discovery run before looking at the results.
    pub discovery_wait: Duration,
    /// Pause between stopping discovery and issuing the connect.
    pub find_stop_delay: Duration,
    /// Upper bound on waiting for the peer's negotiation request (intent 0).
    pub go_neg_request_wait: Duration,
    pub group_formation_timeout: Duration,
    pub ap_sta_connected_timeout: Duration,
    /// Pause on the group owner for the security handshake to finish.
    pub handshake_wait: Duration,
    /// Pause on the client before requesting an address.
    pub dhcp_start_delay: Duration,
    /// Pause on the client between address binding and starting echo.
    pub client_connect_delay: Duration,
    pub go_intent: GoIntent,
    /// Operating channel in MHz; 0 lets the radio choose.
    pub frequency: u32,
    pub peer_filter: PeerFilter,
    pub max_peers: usize,
    /// Group owner's static address; also the echo target of the client.
    pub go_address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub pool_start: Ipv4Addr,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            interface: "wlan0".to_string(),
            discovery_timeout: Duration::from_secs(30),
            discovery_wait: Duration::from_millis(10_000),
            find_stop_delay: Duration::from_millis(500),
            go_neg_request_wait: Duration::from_millis(2_000),
            group_formation_timeout: Duration::from_millis(30_000),
            ap_sta_connected_timeout: Duration::from_millis(10_000),
            handshake_wait: Duration::from_millis(2_000),
            dhcp_start_delay: Duration::ZERO,
            client_connect_delay: Duration::from_millis(2_000),
            go_intent: GoIntent::MAX,
            frequency: 2437,
            peer_filter: PeerFilter::Any,
            max_peers: p2p_core::domain::peer::DEFAULT_MAX_PEERS,
            go_address: Ipv4Addr::new(192, 168, 7, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            pool_start: Ipv4Addr::new(192, 168, 7, 10),
        }
    }
}

// ── Results and errors ────────────────────────────────────────────────────────

/// How a pairing attempt ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingOutcome {
    GroupOwner,
    Client,
    /// The group formed but no role was reported.
    Undetermined,
    /// Discovery found nobody; nothing was attempted.
    NoPeers,
}

/// Coarse error classes used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A bounded wait ran out.  Only the current attempt is lost.
    Timeout,
    /// Negotiation or group formation failed.  Re-trigger to try again.
    FatalAttempt,
    /// Returned straight to the caller: missing interface, busy, bad input.
    Resource,
}

/// Why a pairing attempt failed.
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("a pairing attempt is already in progress")]
    AlreadyInProgress,

    #[error("failed to start discovery: {0}")]
    Discovery(#[source] RadioError),

    #[error("target peer {0} not found among discovered peers")]
    PeerNotFound(MacAddress),

    #[error("connect request failed: {0}")]
    Connect(#[source] RadioError),

    #[error("group formation timed out after {0:?}")]
    GroupFormationTimeout(Duration),

    #[error("group formation failed")]
    GroupFormationFailed,

    #[error("failed to remove group: {0}")]
    GroupRemoval(#[source] RadioError),
}

impl PairingError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::GroupFormationTimeout(_) => ErrorClass::Timeout,
            Self::PeerNotFound(_) | Self::Connect(_) | Self::GroupFormationFailed => {
                ErrorClass::FatalAttempt
            }
            Self::AlreadyInProgress | Self::Discovery(_) | Self::GroupRemoval(_) => {
                ErrorClass::Resource
            }
        }
    }
}

// ── In-flight guard ───────────────────────────────────────────────────────────

/// Holds the in-flight flag for the duration of one attempt.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// The outside-world collaborators of the orchestrator.
#[derive(Clone)]
pub struct PairingPorts {
    pub radio: Arc<dyn RadioManager>,
    pub link: Arc<dyn LinkLayer>,
    pub net: Arc<dyn NetworkConfigurator>,
    pub echo: Arc<dyn EchoService>,
}

/// Drives pairing attempts.  See the module docs for the sequence.
pub struct PairingOrchestrator {
    config: PairingConfig,
    session: SharedSession,
    gates: Arc<GateSet>,
    ports: PairingPorts,
    in_flight: AtomicBool,
    leasing: AtomicBool,
    /// Client-side task waiting for the address binding.
    follow_up: Mutex<Option<JoinHandle<()>>>,
}

impl PairingOrchestrator {
    pub fn new(
        config: PairingConfig,
        session: SharedSession,
        gates: Arc<GateSet>,
        ports: PairingPorts,
    ) -> Self {
        Self {
            config,
            session,
            gates,
            ports,
            in_flight: AtomicBool::new(false),
            leasing: AtomicBool::new(false),
            follow_up: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Resets the session and all gates and activates the interface so it
    /// can take part in negotiation.
    pub fn initialize(&self) {
        self.session.update(|ctx| ctx.reset());
        self.gates.reset_all();
        activate_link(self.ports.link.as_ref());
        info!(
            "P2P initialized on {} (GO intent {})",
            self.config.interface, self.config.go_intent
        );
    }

    fn acquire(&self) -> Result<InFlightGuard<'_>, PairingError> {
        InFlightGuard::acquire(&self.in_flight).ok_or_else(|| {
            warn!("pairing already in progress; ignoring request");
            PairingError::AlreadyInProgress
        })
    }

    /// Runs discovery and, if any peer shows up, the connect sequence.
    pub async fn start_pairing(&self) -> Result<PairingOutcome, PairingError> {
        let _guard = self.acquire()?;
        let attempt = Uuid::new_v4();

        info!("========================================");
        info!("[{attempt}] starting Wi-Fi Direct P2P pairing");
        info!("GO intent: {} (15=GO, 0=Client)", self.config.go_intent);
        if let Some(role) = self.config.go_intent.forced_role() {
            info!("expected role: {role}");
        }
        match self.config.peer_filter {
            PeerFilter::Mac(mac) => info!("target MAC: {mac}"),
            PeerFilter::Any => info!("target MAC: any (strongest signal)"),
        }
        info!("========================================");

        self.session.update(|ctx| {
            ctx.begin_attempt();
            ctx.begin_discovery_window();
            ctx.transition(P2pState::Finding);
        });
        self.gates.negotiation_request.reset();

        if let Err(e) = self
            .ports
            .radio
            .start_discovery(self.config.discovery_timeout)
            .await
        {
            error!("[{attempt}] failed to start P2P discovery: {e}");
            self.session.update(|ctx| ctx.transition(P2pState::Error));
            return Err(PairingError::Discovery(e));
        }

        info!(
            "searching for P2P peers (waiting {} ms)...",
            self.config.discovery_wait.as_millis()
        );
        time::sleep(self.config.discovery_wait).await;

        let peers = self.collect_peers().await;
        info!("found {} P2P peer(s)", peers.len());
        for (i, peer) in peers.iter().enumerate() {
            info!("peer {}: {} {} {} dBm", i + 1, peer.name, peer.mac, peer.rssi);
        }

        if peers.is_empty() {
            info!("[{attempt}] no peers found; trigger pairing on both devices at the same time");
            return Ok(PairingOutcome::NoPeers);
        }

        info!("peer found; initiating connection");
        self.connect_sequence(attempt, peers).await
    }

    /// Runs the connect sequence against the peers accumulated so far, without
    /// a new discovery window.
    pub async fn connect_discovered(&self) -> Result<PairingOutcome, PairingError> {
        let _guard = self.acquire()?;
        let attempt = Uuid::new_v4();
        self.gates.negotiation_request.reset();

        let peers = self.session.update(|ctx| {
            ctx.begin_attempt();
            ctx.discovered.as_slice().to_vec()
        });
        if peers.is_empty() {
            info!("[{attempt}] no discovered peers to connect to");
            return Ok(PairingOutcome::NoPeers);
        }
        self.connect_sequence(attempt, peers).await
    }

    /// The radio's peer table, or the list the dispatcher accumulated when
    /// the radio cannot be queried.
    async fn collect_peers(&self) -> Vec<DiscoveredPeer> {
        match self
            .ports
            .radio
            .discovered_peers(self.config.max_peers)
            .await
        {
            Ok(peers) => {
                self.session.update(|ctx| ctx.discovered.replace(peers.clone()));
                peers
            }
            Err(e) => {
                warn!("could not query radio peer table ({e}); using accumulated list");
                self.session
                    .update(|ctx| ctx.discovered.as_slice().to_vec())
            }
        }
    }

    async fn connect_sequence(
        &self,
        attempt: Uuid,
        peers: Vec<DiscoveredPeer>,
    ) -> Result<PairingOutcome, PairingError> {
        let cfg = &self.config;

        // 1. Discovery must be fully stopped before the connect goes out.
        if let Err(e) = self.ports.radio.stop_discovery().await {
            warn!("failed to stop discovery: {e}");
        }
        debug!("waiting for discovery to stop");
        time::sleep(cfg.find_stop_delay).await;

        // 2. Target selection.
        let target = match select_peer(&peers, &cfg.peer_filter) {
            Ok(peer) => peer.clone(),
            Err(SelectionError::NotFound(mac)) => {
                warn!("[{attempt}] target peer {mac} not found");
                info!("available peers:");
                for (i, peer) in peers.iter().enumerate() {
                    info!("  [{i}] {} {}", peer.name, peer.mac);
                }
                return Err(PairingError::PeerNotFound(mac));
            }
            Err(SelectionError::NoPeers) => return Ok(PairingOutcome::NoPeers),
        };
        self.session.update(|ctx| ctx.peer_address = target.mac);

        info!("[{attempt}] attempting P2P connection with {} ({})", target.name, target.mac);

        // 3. The prospective client lets the group owner's request arrive first.
        if cfg.go_intent.is_prospective_client() {
            info!("waiting for GO negotiation request...");
            match self
                .gates
                .negotiation_request
                .wait(cfg.go_neg_request_wait)
                .await
            {
                Ok(()) => debug!("negotiation request received"),
                Err(_) => debug!(
                    "no negotiation request within {} ms; connecting",
                    cfg.go_neg_request_wait.as_millis()
                ),
            }
        }

        // 4. Connect.
        self.gates.reset_connect_gates();
        self.session.update(|ctx| {
            ctx.go_intent = cfg.go_intent;
            ctx.frequency = cfg.frequency;
            ctx.transition(P2pState::Connecting);
        });
        if let Err(e) = self
            .ports
            .radio
            .connect(target.mac, cfg.go_intent, cfg.frequency)
            .await
        {
            error!("[{attempt}] P2P connect request failed: {e}");
            self.session.update(|ctx| ctx.transition(P2pState::Error));
            return Err(PairingError::Connect(e));
        }

        // 5. Group formation.
        info!("waiting for P2P group formation...");
        if self
            .gates
            .group_formed
            .wait(cfg.group_formation_timeout)
            .await
            .is_err()
        {
            error!(
                "[{attempt}] P2P group formation timed out after {} ms",
                cfg.group_formation_timeout.as_millis()
            );
            return Err(PairingError::GroupFormationTimeout(cfg.group_formation_timeout));
        }
        if self.session.state() == P2pState::Error {
            error!("[{attempt}] P2P group formation failed");
            return Err(PairingError::GroupFormationFailed);
        }

        // 6. Role-specific setup.
        let role = self.session.role();
        info!("[{attempt}] P2P group formed, role: {role}");
        let outcome = match role {
            P2pRole::GroupOwner => {
                self.setup_group_owner().await;
                PairingOutcome::GroupOwner
            }
            P2pRole::Client => {
                self.setup_client().await;
                PairingOutcome::Client
            }
            P2pRole::Undetermined => {
                warn!("[{attempt}] group formed but role is undetermined");
                PairingOutcome::Undetermined
            }
        };

        info!("{}", self.session.snapshot());
        Ok(outcome)
    }

    async fn setup_group_owner(&self) {
        let cfg = &self.config;

        info!("waiting for AP-STA-CONNECTED...");
        if self
            .gates
            .ap_sta_connected
            .wait(cfg.ap_sta_connected_timeout)
            .await
            .is_err()
        {
            warn!(
                "no station connected within {} ms; continuing",
                cfg.ap_sta_connected_timeout.as_millis()
            );
        }

        info!("waiting for EAPOL 4-way handshake to complete...");
        time::sleep(cfg.handshake_wait).await;

        if !self.session.snapshot().connected {
            warn!("peer left during group setup; skipping GO network and echo server");
            return;
        }

        info!("configuring GO network...");
        if let Err(e) =
            self.ports
                .net
                .assign_static_address(&cfg.interface, cfg.go_address, cfg.netmask)
        {
            error!("failed to assign GO address {}: {e}", cfg.go_address);
        }
        match self
            .ports
            .net
            .start_address_leasing(&cfg.interface, cfg.pool_start)
        {
            Ok(()) => self.leasing.store(true, Ordering::Release),
            Err(e) => error!("failed to start address leasing: {e}"),
        }
        info!("=================================");
        info!("Group Owner network ready!");
        info!("GO IP: {}", cfg.go_address);
        info!("address pool: {}", cfg.pool_start);
        info!("=================================");

        if let Err(e) = self.ports.echo.start_server().await {
            error!("failed to start UDP echo server: {e}");
        }
    }

    async fn setup_client(&self) {
        let cfg = &self.config;

        if !cfg.dhcp_start_delay.is_zero() {
            info!(
                "waiting {} ms for GO to start its address pool...",
                cfg.dhcp_start_delay.as_millis()
            );
            time::sleep(cfg.dhcp_start_delay).await;
        }

        if !self.session.snapshot().connected {
            warn!("disconnected before requesting an address; skipping echo client");
            return;
        }

        // Register before requesting so a fast binding cannot be missed.
        let bound = self.ports.net.register_address_bound(&cfg.interface);
        if let Err(e) = self.ports.net.request_dynamic_address(&cfg.interface) {
            error!("failed to request an address: {e}");
            return;
        }
        info!("address requested; waiting for it to be bound...");

        let echo = Arc::clone(&self.ports.echo);
        let session = self.session.clone();
        let target = cfg.go_address;
        let delay = cfg.client_connect_delay;
        let handle = tokio::spawn(async move {
            let Ok(addr) = bound.await else {
                debug!("address-bound waiter dropped before firing");
                return;
            };
            info!("IP address {addr} obtained");
            info!("waiting {} ms before starting echo client", delay.as_millis());
            time::sleep(delay).await;
            if !session.snapshot().connected {
                warn!("link lost before echo could start; skipping echo client");
                return;
            }
            if let Err(e) = echo.start_client(target).await {
                error!("failed to start UDP echo client: {e}");
            }
        });

        let previous = self
            .follow_up
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Cancels the client's pending address-bound task, if any.  Returns
    /// whether one was still running.
    pub fn abort_follow_up(&self) -> bool {
        let pending = self
            .follow_up
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    /// Leaves the current group: stops echo and address leasing, asks the
    /// radio to remove the group, and returns the session to `Idle`.
    pub async fn leave_group(&self) -> Result<(), PairingError> {
        if self.abort_follow_up() {
            debug!("pending echo client start cancelled");
        }

        if let Some(stats) = self.ports.echo.stop().await {
            info!("{stats}");
        }

        if self.leasing.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.ports.net.stop_address_leasing(&self.config.interface) {
                warn!("failed to stop address leasing: {e}");
            }
        }

        let removed = self.ports.radio.remove_group().await;
        self.session.update(|ctx| ctx.group_removed());
        self.gates.reset_connect_gates();

        match removed {
            Ok(()) => {
                info!("left P2P group");
                Ok(())
            }
            Err(e) => {
                warn!("radio failed to remove group: {e}");
                Err(PairingError::GroupRemoval(e))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
