//! Handshake status record.

use std::fmt;

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::{NetAddress, PeerId, PeerRole};

/// Chain identifier bytes. Two nodes can only peer when these are equal.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(Vec<u8>);

impl ChainId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn from_name(name: &str) -> Self {
        Self(name.as_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| c.is_ascii_graphic()) => f.write_str(s),
            _ => {
                for b in &self.0 {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainId({self})")
    }
}

/// Reference to a block by hash and height.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub hash: B256,
    pub number: u64,
}

/// Capability bit flags announced in the status.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Self = Self(0);
    /// Do not expose this node to peer discovery.
    pub const NO_EXPOSE: Self = Self(1 << 0);
    /// Serves full chain sync.
    pub const FULL_SYNC: Self = Self(1 << 1);
    /// Relays transactions and blocks to other peers.
    pub const RELAY: Self = Self(1 << 2);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn set(&mut self, other: Self, on: bool) {
        if on {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capabilities({:#06b})", self.0)
    }
}

/// Identity and listen address of the status sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddress {
    pub id: PeerId,
    pub addr: NetAddress,
}

/// Self-description a node sends during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub chain_id: ChainId,
    pub sender: PeerAddress,
    pub best_block: BlockRef,
    pub genesis: B256,
    pub capabilities: Capabilities,
    pub role: PeerRole,
    /// Node software version.
    pub version: String,
}

impl Status {
    pub fn no_expose(&self) -> bool {
        self.capabilities.contains(Capabilities::NO_EXPOSE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_flags() {
        let mut caps = Capabilities::FULL_SYNC.with(Capabilities::RELAY);
        assert!(caps.contains(Capabilities::RELAY));
        assert!(!caps.contains(Capabilities::NO_EXPOSE));

        caps.set(Capabilities::NO_EXPOSE, true);
        assert!(caps.contains(Capabilities::NO_EXPOSE));
        caps.set(Capabilities::RELAY, false);
        assert_eq!(caps, Capabilities::FULL_SYNC.with(Capabilities::NO_EXPOSE));
    }

    #[test]
    fn test_chain_id_display() {
        assert_eq!(ChainId::from_name("aster.main").to_string(), "aster.main");
        assert_eq!(ChainId::new(vec![0x00, 0xff]).to_string(), "00ff");
    }
}
