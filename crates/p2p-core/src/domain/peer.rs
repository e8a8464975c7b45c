//! Hardware addresses and discovered peers.
//!
//! A [`MacAddress`] is the 6-byte identifier the radio uses for every peer.
//! Discovery fills a [`PeerList`], a bounded, insertion-ordered sequence that
//! is wiped at the start of every discovery window.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Length of a hardware address in bytes.
pub const MAC_ADDR_LEN: usize = 6;

/// Error returned when a textual MAC address cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MacParseError {
    /// The string does not have six colon-separated groups.
    #[error("expected 6 colon-separated octets, got {0}")]
    WrongGroupCount(usize),
    /// One of the groups is not a hexadecimal byte.
    #[error("invalid octet '{0}'")]
    InvalidOctet(String),
}

/// A 6-byte hardware (MAC) address.
///
/// Displays as lower-case `xx:xx:xx:xx:xx:xx`.  The all-zero address is used
/// as the "no peer" marker in the session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct MacAddress(pub [u8; MAC_ADDR_LEN]);

impl MacAddress {
    /// The all-zero address.
    pub const ZERO: MacAddress = MacAddress([0; MAC_ADDR_LEN]);

    pub fn new(bytes: [u8; MAC_ADDR_LEN]) -> Self {
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn octets(&self) -> [u8; MAC_ADDR_LEN] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    /// Parses `xx:xx:xx:xx:xx:xx`.  Octets are hex and case-insensitive; a
    /// single hex digit per octet is accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups: Vec<&str> = s.trim().split(':').collect();
        if groups.len() != MAC_ADDR_LEN {
            return Err(MacParseError::WrongGroupCount(groups.len()));
        }

        let mut bytes = [0u8; MAC_ADDR_LEN];
        for (slot, group) in bytes.iter_mut().zip(&groups) {
            if group.is_empty() || group.len() > 2 {
                return Err(MacParseError::InvalidOctet((*group).to_string()));
            }
            *slot = u8::from_str_radix(group, 16)
                .map_err(|_| MacParseError::InvalidOctet((*group).to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A peer reported by the radio during a discovery window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPeer {
    pub mac: MacAddress,
    /// Human-readable device name advertised by the peer.
    pub name: String,
    /// Received signal strength in dBm (more negative is weaker).
    pub rssi: i32,
}

impl DiscoveredPeer {
    pub fn new(mac: MacAddress, name: impl Into<String>, rssi: i32) -> Self {
        Self {
            mac,
            name: name.into(),
            rssi,
        }
    }
}

/// Bounded, insertion-ordered list of discovered peers.
///
/// Pushing past the capacity discards the new entry and logs a warning; it is
/// a degraded condition, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerList {
    peers: Vec<DiscoveredPeer>,
    capacity: usize,
}

impl PeerList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            peers: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `peer`.  Returns `false` when the list is full and the peer
    /// was discarded.
    pub fn push(&mut self, peer: DiscoveredPeer) -> bool {
        if self.peers.len() >= self.capacity {
            warn!(
                "discovered-peer list full ({} entries); dropping {}",
                self.capacity, peer.mac
            );
            return false;
        }
        self.peers.push(peer);
        true
    }

    /// Empties the list, keeping the capacity.
    pub fn clear(&mut self) {
        self.peers.clear();
    }

    /// Replaces the whole content with `peers`, truncated to the capacity.
    pub fn replace(&mut self, peers: impl IntoIterator<Item = DiscoveredPeer>) {
        self.peers.clear();
        self.peers.extend(peers.into_iter().take(self.capacity));
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[DiscoveredPeer] {
        &self.peers
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DiscoveredPeer> {
        self.peers.iter()
    }
}

impl Default for PeerList {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_PEERS)
    }
}

/// Default capacity of the discovered-peer list.
pub const DEFAULT_MAX_PEERS: usize = 10;

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(last: u8, rssi: i32) -> DiscoveredPeer {
        DiscoveredPeer::new(MacAddress([0x02, 0, 0, 0, 0, last]), format!("peer-{last}"), rssi)
    }

    #[test]
    fn test_mac_display_is_lower_case_colon_separated() {
        let mac = MacAddress([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);
        assert_eq!(mac.to_string(), "de:ad:be:ef:00:01");
    }

    #[test]
    fn test_mac_parse_accepts_upper_case() {
        let mac: MacAddress = "DE:AD:BE:EF:00:01".parse().unwrap();
        assert_eq!(mac, MacAddress([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]));
    }

    #[test]
    fn test_mac_parse_accepts_single_digit_octets() {
        let mac: MacAddress = "2:0:0:0:0:a".parse().unwrap();
        assert_eq!(mac, MacAddress([2, 0, 0, 0, 0, 0x0a]));
    }

    #[test]
    fn test_mac_parse_rejects_wrong_group_count() {
        let result = "de:ad:be:ef:00".parse::<MacAddress>();
        assert_eq!(result, Err(MacParseError::WrongGroupCount(5)));
    }

    #[test]
    fn test_mac_parse_rejects_non_hex_octet() {
        let result = "de:ad:be:ef:00:zz".parse::<MacAddress>();
        assert_eq!(result, Err(MacParseError::InvalidOctet("zz".to_string())));
    }

    #[test]
    fn test_mac_parse_rejects_three_digit_octet() {
        assert!("de:ad:be:ef:00:100".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_zero_mac_is_zero() {
        assert!(MacAddress::ZERO.is_zero());
        assert!(!MacAddress([0, 0, 0, 0, 0, 1]).is_zero());
    }

    #[test]
    fn test_peer_list_discards_entries_past_capacity() {
        // Arrange
        let mut list = PeerList::with_capacity(2);

        // Act
        let accepted: Vec<bool> = (1..=3).map(|i| list.push(peer(i, -50))).collect();

        // Assert
        assert_eq!(accepted, vec![true, true, false]);
        assert_eq!(list.len(), 2);
        assert_eq!(list.as_slice()[1].mac, peer(2, 0).mac);
    }

    #[test]
    fn test_peer_list_replace_truncates_to_capacity() {
        let mut list = PeerList::with_capacity(2);
        list.push(peer(9, -10));

        list.replace((1..=5).map(|i| peer(i, -60)));

        assert_eq!(list.len(), 2);
        assert_eq!(list.as_slice()[0].mac, peer(1, 0).mac);
    }

    #[test]
    fn test_peer_list_clear_keeps_capacity() {
        let mut list = PeerList::with_capacity(4);
        list.push(peer(1, -40));
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.capacity(), 4);
    }
}
