//! Choosing which discovered peer to connect to.
//!
//! Two modes:
//!
//! - **Filtered** – the operator configured a target MAC; only an exact match
//!   is accepted.
//! - **Automatic** – the strongest signal wins.  Ties go to the peer that was
//!   seen first, so the result is deterministic for a given discovery order.

use thiserror::Error;
use tracing::warn;

use super::peer::{DiscoveredPeer, MacAddress};

/// How the target peer is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerFilter {
    /// Pick the peer with the strongest RSSI.
    #[default]
    Any,
    /// Only connect to this exact address.
    Mac(MacAddress),
}

impl PeerFilter {
    /// Builds a filter from an optional configured MAC string.  An empty
    /// string means "no filter".
    pub fn from_config(target: &str) -> Result<Self, super::peer::MacParseError> {
        let target = target.trim();
        if target.is_empty() {
            return Ok(Self::Any);
        }
        Ok(Self::Mac(target.parse()?))
    }
}

/// Why no peer could be selected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no peers discovered")]
    NoPeers,
    #[error("configured peer {0} was not discovered")]
    NotFound(MacAddress),
}

/// Selects the peer to connect to from `peers` (in discovery order).
///
/// # Errors
///
/// - [`SelectionError::NoPeers`] when `peers` is empty.
/// - [`SelectionError::NotFound`] when a MAC filter matches no entry.
pub fn select_peer<'a>(
    peers: &'a [DiscoveredPeer],
    filter: &PeerFilter,
) -> Result<&'a DiscoveredPeer, SelectionError> {
    if peers.is_empty() {
        return Err(SelectionError::NoPeers);
    }

    match filter {
        PeerFilter::Mac(target) => peers
            .iter()
            .find(|p| p.mac == *target)
            .ok_or(SelectionError::NotFound(*target)),
        PeerFilter::Any => {
            if peers.len() > 1 {
                warn!(
                    "{} peers discovered; selecting the strongest signal",
                    peers.len()
                );
            }
            // Strict comparison keeps the first-seen peer on equal RSSI.
            let mut best = &peers[0];
            for peer in &peers[1..] {
                if peer.rssi > best.rssi {
                    best = peer;
                }
            }
            Ok(best)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
