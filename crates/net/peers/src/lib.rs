//! Peer lifecycle management: handshake workers, a single-writer registry, collision
//! resolution and outbound pool fill.
//!
//! [`PeerManager`] is the entry point. Its event loop is the only code that mutates the
//! registry; readers get immutable snapshots through [`PeerManager::get_peers`] and
//! [`PeerManager::get_peer_addresses`].

pub mod collision;
mod config;
mod error;
pub mod events;
mod manager;
mod metrics;
mod registry;
mod remote;
mod scheduler;
mod state;
mod traits;
mod transport;
mod waiting;
mod worker;

#[cfg(test)]
mod test_utils;

pub use config::{DesignatedPeer, Network, PeerManagerConfig};
pub use error::{ConfigError, PeerManagerError};
pub use events::{EventEmitter, PeerEvent};
pub use manager::PeerManager;
pub use registry::{PeerCache, PeerInfo};
pub use remote::{DefaultPeerFactory, PeerRemover, RemotePeerImpl};
pub use state::ManagerStatus;
pub use traits::{MessageSink, NetworkTransport, NullSink, PeerFactory, RemotePeer};
pub use transport::{TcpTransport, serve_inbound};
pub use worker::ConnWorkResult;
