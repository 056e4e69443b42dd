//! Peer manager configuration.

use std::{collections::HashSet, time::Duration};

use aster_net_handshake::{MAGIC_MAIN, MAGIC_TEST, VersionManager};
use aster_net_primitives::{NetAddress, P2PVersion, PeerId, PeerMeta};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

const DEFAULT_POOL_TARGET: usize = 16;
const DEFAULT_MAX_PEERS: usize = 100;
const DEFAULT_MAX_PENDING_HANDSHAKES: usize = 32;
const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 20;
const DEFAULT_DIAL_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POOL_CHECK_INTERVAL_SECS: u64 = 30;
const DEFAULT_RETRY_BASE_SECS: u64 = 5;
const DEFAULT_RETRY_MAX_SECS: u64 = 600;

/// Network the node joins; selects the handshake magic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn magic(&self) -> u32 {
        match self {
            Network::Mainnet => MAGIC_MAIN,
            Network::Testnet => MAGIC_TEST,
        }
    }
}

/// A peer the node always tries to stay connected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignatedPeer {
    pub id: PeerId,
    pub host: String,
    pub port: u16,
}

impl DesignatedPeer {
    pub fn meta(&self) -> PeerMeta {
        let mut meta = PeerMeta::new(self.id, NetAddress::new(self.host.clone(), self.port));
        meta.designated = true;
        meta
    }
}

/// Peer manager configuration (TOML-serializable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerManagerConfig {
    /// Peers that are always dialled and never count against `max_peers`.
    #[serde(default)]
    pub designated_peers: Vec<DesignatedPeer>,

    /// Peers never advertised to other nodes.
    #[serde(default)]
    pub hidden_peers: Vec<PeerId>,

    /// Outbound connections the pool is topped up to.
    #[serde(default = "default_pool_target")]
    pub pool_target: usize,

    /// Registry capacity for non-designated peers.
    #[serde(default = "default_max_peers")]
    pub max_peers: usize,

    /// Handshakes allowed in flight at once.
    #[serde(default = "default_max_pending_handshakes")]
    pub max_pending_handshakes: usize,

    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,

    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,

    #[serde(default = "default_pool_check_interval_secs")]
    pub pool_check_interval_secs: u64,

    /// First redial delay for a designated peer.
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,

    /// Upper bound of the designated peer redial delay.
    #[serde(default = "default_retry_max_secs")]
    pub retry_max_secs: u64,

    /// Accepted protocol versions, most preferred first.
    #[serde(default = "default_versions")]
    pub versions: Vec<P2PVersion>,

    #[serde(default)]
    pub network: Network,
}

impl Default for PeerManagerConfig {
    fn default() -> Self {
        Self {
            designated_peers: Vec::new(),
            hidden_peers: Vec::new(),
            pool_target: default_pool_target(),
            max_peers: default_max_peers(),
            max_pending_handshakes: default_max_pending_handshakes(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            dial_timeout_secs: default_dial_timeout_secs(),
            pool_check_interval_secs: default_pool_check_interval_secs(),
            retry_base_secs: default_retry_base_secs(),
            retry_max_secs: default_retry_max_secs(),
            versions: default_versions(),
            network: Network::default(),
        }
    }
}

fn default_pool_target() -> usize {
    DEFAULT_POOL_TARGET
}

fn default_max_peers() -> usize {
    DEFAULT_MAX_PEERS
}

fn default_max_pending_handshakes() -> usize {
    DEFAULT_MAX_PENDING_HANDSHAKES
}

fn default_handshake_timeout_secs() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_SECS
}

fn default_dial_timeout_secs() -> u64 {
    DEFAULT_DIAL_TIMEOUT_SECS
}

fn default_pool_check_interval_secs() -> u64 {
    DEFAULT_POOL_CHECK_INTERVAL_SECS
}

fn default_retry_base_secs() -> u64 {
    DEFAULT_RETRY_BASE_SECS
}

fn default_retry_max_secs() -> u64 {
    DEFAULT_RETRY_MAX_SECS
}

fn default_versions() -> Vec<P2PVersion> {
    vec![P2PVersion::V032, P2PVersion::V031, P2PVersion::V030]
}

impl PeerManagerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Reject configurations the manager cannot run with.
    pub fn validate(&self, local_id: &PeerId) -> Result<(), ConfigError> {
        if self.versions.is_empty() {
            return Err(ConfigError::NoVersions);
        }
        let mut seen = HashSet::new();
        for version in &self.versions {
            if !VersionManager::is_supported(*version) {
                return Err(ConfigError::UnknownVersion(*version));
            }
            if !seen.insert(*version) {
                return Err(ConfigError::DuplicateVersion(*version));
            }
        }
        if self.handshake_timeout_secs == 0 {
            return Err(ConfigError::ZeroHandshakeTimeout);
        }
        if self.max_peers == 0 {
            return Err(ConfigError::ZeroMaxPeers);
        }
        if self.pool_target > self.max_peers {
            return Err(ConfigError::PoolTargetExceedsMax {
                target: self.pool_target,
                max: self.max_peers,
            });
        }
        if self.designated_peers.iter().any(|p| p.id == *local_id) {
            return Err(ConfigError::SelfDesignated);
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    /// Never zero, so it can drive an interval.
    pub fn pool_check_interval(&self) -> Duration {
        Duration::from_secs(self.pool_check_interval_secs.max(1))
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_secs(self.retry_base_secs)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_secs(self.retry_max_secs.max(self.retry_base_secs))
    }
}
