//! # p2p-core
//!
//! Shared library for the Wi-Fi Direct echo node containing the session
//! model, peer selection rules, echo statistics, and the echo packet format.
//!
//! It has zero dependencies on OS APIs, async runtimes, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! Two devices that both want to talk directly (no access point in between)
//! run a negotiation.  One side ends up as the *group owner* (the coordinator
//! that hands out addresses), the other as the *client*.  Once the link is up
//! the client fires timestamped UDP datagrams at the group owner, which echoes
//! them back, and the client measures round-trip time and loss.
//!
//! This crate (`p2p-core`) is the pure foundation:
//!
//! - **`domain`** – The session record (`SessionContext`), discovered peers,
//!   the GO intent value, peer selection, and the online echo statistics.
//!
//! - **`protocol`** – The echo datagram layout: a short ASCII header with the
//!   sequence number and send timestamp, padded with a filler letter.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `p2p_core::SessionContext` instead of `p2p_core::domain::session::SessionContext`.
pub use domain::intent::{GoIntent, IntentError};
pub use domain::peer::{DiscoveredPeer, MacAddress, MacParseError, PeerList};
pub use domain::selection::{select_peer, PeerFilter, SelectionError};
pub use domain::session::{P2pEvent, P2pRole, P2pState, SessionContext};
pub use domain::stats::EchoStats;
pub use protocol::echo::{EchoHeader, ProtocolError};
