//! Descriptive peer records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{P2PVersion, PeerId, Status};

/// Host and port a peer listens on. The host may be an IP literal or a DNS name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetAddress {
    pub host: String,
    pub port: u16,
}

impl NetAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Which side opened the connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn is_inbound(&self) -> bool {
        matches!(self, Direction::Inbound)
    }

    pub fn is_outbound(&self) -> bool {
        matches!(self, Direction::Outbound)
    }
}

/// Role a node plays in the network, announced in its status.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PeerRole {
    #[default]
    Watcher,
    BlockProducer,
    Agent,
}

/// Per-peer descriptive record, produced once at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMeta {
    pub id: PeerId,
    pub addr: NetAddress,
    pub direction: Direction,
    /// Configured as always-connected.
    pub designated: bool,
    /// Never advertised to other nodes.
    pub hidden: bool,
    /// Node software version announced by the peer.
    pub version: String,
    pub protocol_version: P2PVersion,
    pub role: PeerRole,
}

impl PeerMeta {
    /// Dial target with only identity and address known.
    pub fn new(id: PeerId, addr: NetAddress) -> Self {
        Self {
            id,
            addr,
            direction: Direction::Outbound,
            designated: false,
            hidden: false,
            version: String::new(),
            protocol_version: P2PVersion::UNKNOWN,
            role: PeerRole::default(),
        }
    }

    /// Meta derived from a remote status. Designation is a local decision and starts unset.
    pub fn from_status(status: &Status, direction: Direction, protocol_version: P2PVersion) -> Self {
        Self {
            id: status.sender.id,
            addr: status.sender.addr.clone(),
            direction,
            designated: false,
            hidden: status.no_expose(),
            version: status.version.clone(),
            protocol_version,
            role: status.role,
        }
    }

    pub fn is_outbound(&self) -> bool {
        self.direction.is_outbound()
    }
}
