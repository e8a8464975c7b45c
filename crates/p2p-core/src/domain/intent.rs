//! Group-owner intent.
//!
//! During negotiation each device declares how much it wants to become the
//! group owner, on a 0–15 scale.  The higher value wins.  `15` means "must be
//! group owner", `0` means "must be client"; anything in between leaves the
//! outcome to the negotiation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::session::P2pRole;

/// Error returned for an out-of-range intent value.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("GO intent must be in 0..=15, got {0}")]
pub struct IntentError(pub u8);

/// A validated group-owner intent value (0..=15).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct GoIntent(u8);

impl GoIntent {
    /// Highest intent: this device insists on being the group owner.
    pub const MAX: GoIntent = GoIntent(15);
    /// Lowest intent: this device insists on being the client.
    pub const MIN: GoIntent = GoIntent(0);

    /// # Errors
    ///
    /// Returns [`IntentError`] when `value > 15`.
    pub fn new(value: u8) -> Result<Self, IntentError> {
        if value > Self::MAX.0 {
            return Err(IntentError(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Whether this device is expected to end up as the client.
    ///
    /// The prospective client delays its connect call so the group owner's
    /// negotiation request arrives first.
    pub fn is_prospective_client(self) -> bool {
        self == Self::MIN
    }

    /// The role this intent forces, if any.
    pub fn forced_role(self) -> Option<P2pRole> {
        match self.0 {
            15 => Some(P2pRole::GroupOwner),
            0 => Some(P2pRole::Client),
            _ => None,
        }
    }
}

impl TryFrom<u8> for GoIntent {
    type Error = IntentError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GoIntent> for u8 {
    fn from(intent: GoIntent) -> Self {
        intent.0
    }
}

impl Default for GoIntent {
    fn default() -> Self {
        Self::MAX
    }
}

impl fmt::Display for GoIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
