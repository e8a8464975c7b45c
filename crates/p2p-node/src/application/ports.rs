//! Ports: the traits the application layer uses to reach the outside world.
//!
//! The pairing logic never talks to a radio driver, a network stack, or a
//! socket directly.  It calls these traits, and `main.rs` (or a test) decides
//! which implementation sits behind them.
//!
//! # Why traits here? (for beginners)
//!
//! Putting the trait next to the code that *uses* it, instead of next to the
//! code that *implements* it, keeps the dependency arrow pointing inwards:
//! `infrastructure` depends on `application`, never the reverse.  The
//! simulated radio in `infrastructure::sim` and the recording doubles in the
//! unit tests are just two more implementations.
//!
//! # Sync vs async ports
//!
//! Radio and echo operations may take a while, so they are `async` (via
//! `async-trait`).  Link flags and address configuration are quick,
//! fire-and-forget calls and stay synchronous, which lets the event
//! dispatcher call them from its non-blocking handlers.

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use p2p_core::{DiscoveredPeer, EchoStats, GoIntent, MacAddress};
use thiserror::Error;
use tokio::sync::oneshot;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors reported by the radio management subsystem.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RadioError {
    /// The P2P interface does not exist.
    #[error("no P2P-capable interface available")]
    NoInterface,
    /// The radio refused the request with a status code.
    #[error("request rejected by radio (status {0})")]
    Rejected(i32),
    /// The radio could not be reached at all.
    #[error("radio unavailable: {0}")]
    Unavailable(String),
}

/// Errors reported by link-layer flag changes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The interface is already administratively up.  Not a failure.
    #[error("interface already up")]
    AlreadyUp,
    #[error("link operation failed: {0}")]
    Failed(String),
}

/// Errors reported by the network-configuration subsystem.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetConfigError {
    #[error("unknown interface '{0}'")]
    UnknownInterface(String),
    #[error("address configuration failed: {0}")]
    Failed(String),
}

/// Errors raised by the echo engine.
#[derive(Debug, Error)]
pub enum EchoError {
    /// A session (server or client) is already running.
    #[error("an echo session is already running")]
    AlreadyRunning,
    /// The UDP socket could not be bound.
    #[error("failed to bind echo socket on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

// ── Notifications ─────────────────────────────────────────────────────────────

/// Asynchronous notifications delivered by the radio subsystem.
///
/// Status codes follow the driver convention: `0` is success, anything else
/// is a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioNotification {
    DeviceFound(DiscoveredPeer),
    ConnectResult { status: i32 },
    ApEnableResult { status: i32 },
    ApStaConnected { mac: MacAddress },
    ApStaDisconnected { mac: MacAddress },
    /// The peer sent us a group-owner negotiation request.
    NegotiationRequest { mac: MacAddress },
    /// Our station link to the group was lost.
    Disconnected,
}

// ── Ports ─────────────────────────────────────────────────────────────────────

/// Radio / P2P management operations for one interface.
///
/// Results of `connect` arrive later as [`RadioNotification`]s; the return
/// value only says whether the request was accepted.
#[async_trait]
pub trait RadioManager: Send + Sync {
    /// Starts peer discovery, running for at most `timeout`.
    async fn start_discovery(&self, timeout: Duration) -> Result<(), RadioError>;

    async fn stop_discovery(&self) -> Result<(), RadioError>;

    /// Issues a connect request.  `frequency` is in MHz, `0` lets the radio
    /// choose.
    async fn connect(
        &self,
        peer: MacAddress,
        intent: GoIntent,
        frequency: u32,
    ) -> Result<(), RadioError>;

    /// Peers the radio has seen in the current window, at most `max`.
    async fn discovered_peers(&self, max: usize) -> Result<Vec<DiscoveredPeer>, RadioError>;

    /// Tears down the current group, if any.
    async fn remove_group(&self) -> Result<(), RadioError>;
}

/// Link-layer flags of the P2P interface.
pub trait LinkLayer: Send + Sync {
    /// Brings the interface administratively up.
    fn set_admin_up(&self) -> Result<(), LinkError>;
    fn carrier_on(&self) -> Result<(), LinkError>;
    fn dormant_off(&self) -> Result<(), LinkError>;
}

/// IPv4 configuration of the P2P interface.
#[cfg_attr(test, mockall::automock)]
pub trait NetworkConfigurator: Send + Sync {
    fn assign_static_address(
        &self,
        iface: &str,
        addr: Ipv4Addr,
        netmask: Ipv4Addr,
    ) -> Result<(), NetConfigError>;

    /// Starts handing out addresses from `pool_start` upwards.  Calling it
    /// while the service already runs is not an error.
    fn start_address_leasing(&self, iface: &str, pool_start: Ipv4Addr)
        -> Result<(), NetConfigError>;

    fn stop_address_leasing(&self, iface: &str) -> Result<(), NetConfigError>;

    /// Registers a one-shot waiter that fires with the bound address once a
    /// dynamic address has been assigned.  Register before requesting.
    fn register_address_bound(&self, iface: &str) -> oneshot::Receiver<Ipv4Addr>;

    fn request_dynamic_address(&self, iface: &str) -> Result<(), NetConfigError>;
}

/// The UDP echo diagnostic engine.  One role at a time.
#[async_trait]
pub trait EchoService: Send + Sync {
    /// Starts echoing datagrams back to their sender.
    async fn start_server(&self) -> Result<(), EchoError>;

    /// Starts sending timestamped datagrams to `target`.
    async fn start_client(&self, target: Ipv4Addr) -> Result<(), EchoError>;

    /// Stops the running session and returns its final statistics.
    /// Returns `None` when nothing was running.
    async fn stop(&self) -> Option<EchoStats>;

    /// Live statistics of the current (or last) session.
    fn stats(&self) -> EchoStats;

    fn is_running(&self) -> bool;
}
