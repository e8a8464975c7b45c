//! The session record.
//!
//! One [`SessionContext`] exists per node.  It holds the connection state,
//! the negotiated role, the active peer, and the parameters of the last
//! connect attempt.  The event dispatcher and the pairing orchestrator are
//! the only writers.
//!
//! # State machine (for beginners)
//!
//! ```text
//!   Idle ──discovery──► Finding ──device found──► Found
//!                                                   │ connect issued
//!                                                   ▼
//!   Error ◄──rejected / failed──────────────── Connecting
//!                                                   │
//!                      ┌──────────AP enabled────────┤
//!                      ▼                            ▼ connect ok
//!                 GroupFormed                   Connected
//! ```
//!
//! The role is only meaningful once a group exists; every transition into a
//! state without a group clears it.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::intent::GoIntent;
use super::peer::{DiscoveredPeer, MacAddress, PeerList};

/// Connection state of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum P2pState {
    #[default]
    Idle,
    Finding,
    Found,
    Connecting,
    Connected,
    GroupFormed,
    Error,
}

impl P2pState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Finding => "FINDING",
            Self::Found => "FOUND",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::GroupFormed => "GROUP_FORMED",
            Self::Error => "ERROR",
        }
    }

    /// States in which a group exists and the role has been decided.
    pub fn has_group(self) -> bool {
        matches!(self, Self::Connected | Self::GroupFormed)
    }
}

impl fmt::Display for P2pState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The side of the link this node ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum P2pRole {
    #[default]
    Undetermined,
    /// Coordinator: hosts the group and hands out addresses.
    GroupOwner,
    /// Joined the peer's group.
    Client,
}

impl P2pRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Undetermined => "UNDETERMINED",
            Self::GroupOwner => "GROUP_OWNER",
            Self::Client => "CLIENT",
        }
    }
}

impl fmt::Display for P2pRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-facing events forwarded to registered sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum P2pEvent {
    DeviceFound,
    /// We started a group and are the group owner.
    GroupStarted,
    /// We joined the peer's group as client.
    Connected,
    ConnectFailed,
    PeerJoined,
    ApStationConnected,
    PeerLeft,
    Disconnected,
}

impl fmt::Display for P2pEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::DeviceFound => "P2P device found",
            Self::GroupStarted => "P2P group started (we are GO)",
            Self::Connected => "Connected to P2P group (we are Client)",
            Self::ConnectFailed => "P2P connection failed",
            Self::PeerJoined => "Peer joined our group",
            Self::ApStationConnected => "AP-STA-CONNECTED received",
            Self::PeerLeft => "Peer left our group",
            Self::Disconnected => "Disconnected from P2P group",
        };
        f.write_str(text)
    }
}

/// The per-node session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub state: P2pState,
    pub role: P2pRole,
    /// Active or selected peer; [`MacAddress::ZERO`] when there is none.
    pub peer_address: MacAddress,
    /// `DeviceFound` deliveries in the current discovery window, including
    /// those the bounded list had to drop.
    pub peer_count: u32,
    pub go_intent: GoIntent,
    /// Channel of the last connect attempt in MHz; 0 lets the radio choose.
    pub frequency: u32,
    pub group_formed: bool,
    pub connected: bool,
    pub discovered: PeerList,
}

impl SessionContext {
    pub fn new(max_peers: usize) -> Self {
        Self {
            state: P2pState::Idle,
            role: P2pRole::Undetermined,
            peer_address: MacAddress::ZERO,
            peer_count: 0,
            go_intent: GoIntent::default(),
            frequency: 0,
            group_formed: false,
            connected: false,
            discovered: PeerList::with_capacity(max_peers),
        }
    }

    /// Returns the record to its freshly initialized state.
    pub fn reset(&mut self) {
        *self = Self::new(self.discovered.capacity());
    }

    /// Moves to `state`, clearing the role unless `state` has a group.
    pub fn transition(&mut self, state: P2pState) {
        self.state = state;
        if !state.has_group() {
            self.role = P2pRole::Undetermined;
        }
    }

    /// Drops what a previous attempt left behind: link flags, active peer,
    /// and role.  Discovery results are kept.
    pub fn begin_attempt(&mut self) {
        self.connected = false;
        self.group_formed = false;
        self.clear_peer();
        self.role = P2pRole::Undetermined;
    }

    /// Starts a new discovery window: the peer counter and list are wiped.
    pub fn begin_discovery_window(&mut self) {
        self.peer_count = 0;
        self.discovered.clear();
    }

    /// Records one `DeviceFound` delivery.  Returns `false` when the bounded
    /// list was full; the counter and `peer_address` are updated regardless.
    pub fn record_device_found(&mut self, peer: DiscoveredPeer) -> bool {
        self.peer_count = self.peer_count.saturating_add(1);
        self.peer_address = peer.mac;
        self.transition(P2pState::Found);
        self.discovered.push(peer)
    }

    /// The active peer, if any.
    pub fn peer(&self) -> Option<MacAddress> {
        (!self.peer_address.is_zero()).then_some(self.peer_address)
    }

    pub fn clear_peer(&mut self) {
        self.peer_address = MacAddress::ZERO;
    }

    /// The group was torn down locally or lost: back to `Idle` with all link
    /// flags cleared.
    pub fn group_removed(&mut self) {
        self.begin_attempt();
        self.transition(P2pState::Idle);
    }

    /// Whether the role/state invariant holds.
    pub fn is_consistent(&self) -> bool {
        self.role == P2pRole::Undetermined || self.state.has_group()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(super::peer::DEFAULT_MAX_PEERS)
    }
}

/// Renders the multi-line status block.
impl fmt::Display for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yes_no = |b: bool| if b { "Yes" } else { "No" };
        writeln!(f, "=== P2P Status ===")?;
        writeln!(f, "State: {}", self.state)?;
        writeln!(f, "Role: {}", self.role)?;
        writeln!(f, "GO Intent: {}", self.go_intent)?;
        writeln!(f, "Frequency: {} MHz", self.frequency)?;
        writeln!(f, "Group Formed: {}", yes_no(self.group_formed))?;
        writeln!(f, "Connected: {}", yes_no(self.connected))?;
        if self.connected || self.peer_count > 0 {
            writeln!(f, "Peer MAC: {}", self.peer_address)?;
        }
        writeln!(f, "Discovered Peers: {}", self.peer_count)?;
        write!(f, "==================")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
