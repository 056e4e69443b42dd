//! Identity, status and message types shared by the aster networking crates.
//!
//! - [`PeerId`] - public-key derived peer identity with a total byte order
//! - [`PeerMeta`] - descriptive record of a connected or candidate peer
//! - [`Status`] - self-description exchanged during the handshake
//! - [`P2PVersion`] - wire protocol version identifier
//! - [`Message`] - subprotocol-tagged message carried after the handshake

mod message;
mod meta;
mod peer_id;
mod status;
mod version;

pub use message::{Message, MessageBodyError, SubProtocol};
pub use meta::{Direction, NetAddress, PeerMeta, PeerRole};
pub use peer_id::{PeerId, PeerIdParseError};
pub use status::{BlockRef, Capabilities, ChainId, PeerAddress, Status};
pub use version::{P2PVersion, P2PVersionParseError};

/// Re-exported so dependants can build block references without naming alloy directly.
pub use alloy_primitives::B256;
