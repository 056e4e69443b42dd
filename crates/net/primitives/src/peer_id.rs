//! Public-key derived peer identity.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{B256, keccak256};
use serde::{Deserialize, Serialize};

/// Globally unique peer identity, the keccak-256 digest of the peer's public key.
///
/// The derived `Ord` is the byte order of the digest. Collision resolution relies on
/// both ends of a connection computing the same order from the same public values.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(B256);

impl PeerId {
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self(keccak256(public_key))
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(B256::new(bytes))
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// First four bytes in hex, used as a log-friendly name.
    pub fn short(&self) -> String {
        self.0
            .iter()
            .take(4)
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.short())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid peer id: {0}")]
pub struct PeerIdParseError(String);

impl FromStr for PeerId {
    type Err = PeerIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s)
            .map(Self)
            .map_err(|e| PeerIdParseError(e.to_string()))
    }
}

impl From<B256> for PeerId {
    fn from(value: B256) -> Self {
        Self(value)
    }
}
