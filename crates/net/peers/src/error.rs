use aster_net_handshake::HandshakeError;
use aster_net_primitives::{P2PVersion, PeerId};

/// Configuration rejected before the manager starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No protocol versions configured")]
    NoVersions,
    #[error("Unknown protocol version: {0}")]
    UnknownVersion(P2PVersion),
    #[error("Protocol version listed twice: {0}")]
    DuplicateVersion(P2PVersion),
    #[error("Handshake timeout must be non-zero")]
    ZeroHandshakeTimeout,
    #[error("max_peers must be non-zero")]
    ZeroMaxPeers,
    #[error("Pool target {target} exceeds max peers {max}")]
    PoolTargetExceedsMax { target: usize, max: usize },
    #[error("Local node listed as a designated peer")]
    SelfDesignated,
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PeerManagerError {
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
    /// The connection lost a simultaneous dial race. Not a fault.
    #[error("Connection collision resolved")]
    CollisionResolved,
    #[error("Registry full ({max} peers)")]
    RegistryFull { max: usize },
    #[error("Peer already registered: {0}")]
    DuplicateRegistration(PeerId),
    #[error("Stale result: seq {seq}, latest {latest}")]
    StaleResult { seq: u32, latest: u32 },
    #[error("Peer factory error: {0}")]
    Factory(String),
    #[error("Manager already started")]
    AlreadyStarted,
    #[error("Manager not running")]
    NotRunning,
    #[error("Peer stopped")]
    PeerStopped,
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
