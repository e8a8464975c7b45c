//! Domain entities for the Wi-Fi Direct echo node.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What is "domain" in Clean Architecture? (for beginners)
//!
//! The innermost layer of the application.  Domain code has **no** imports
//! from OS APIs, network libraries, or async runtimes, so it compiles and
//! tests anywhere.  The outer layers (the pairing orchestrator, the UDP echo
//! engine) depend on these types, never the other way around.

/// Group-owner intent value used during negotiation.
pub mod intent;

/// Hardware addresses and the bounded discovered-peer list.
pub mod peer;

/// Deterministic choice of the peer to connect to.
pub mod selection;

/// The session record: state, role, and peer of the current pairing.
pub mod session;

/// Online loss / latency aggregation for echo sessions.
pub mod stats;
