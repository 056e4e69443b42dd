//! Versioned wire handshake for aster peers.
//!
//! A connection starts with a fixed-size [`HsHeader`] carrying a network magic and a
//! protocol version. Once the header is accepted, a version specific
//! [`VersionedHandshaker`] exchanges [`Status`](aster_net_primitives::Status) records and
//! hands back a [`MsgReadWriter`] for the rest of the connection's life.
//!
//! [`WireHandshaker`] drives the whole sequence under a single deadline.

use tokio::io::{AsyncRead, AsyncWrite};

mod codec;
pub use codec::{
    FramedMsgRW, HEADER_LEN, HsHeader, MAGIC_MAIN, MAGIC_TEST, MAX_PAYLOAD_SIZE, MsgReadWriter,
    read_header,
};

mod error;
pub use error::{ErrorKind, HandshakeError};

mod protocol;
pub use protocol::{Handshaked, WireHandshaker};

mod status;
pub use status::{LocalStatus, StatusProvider};

mod version_manager;
pub use version_manager::VersionManager;

mod versioned;
pub use versioned::{HandshakeContext, V030Handshaker, V032Handshaker, VersionedHandshaker};

/// Byte stream a handshake can run over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Type-erased connection stream, as produced by a transport.
pub type BoxedStream = Box<dyn AsyncStream>;
