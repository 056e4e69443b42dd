//! Per-version status exchange run after the header has been agreed.

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use aster_net_primitives::{P2PVersion, Status};
use tokio::time::Instant;

use crate::{HandshakeError, MsgReadWriter, StatusProvider};

mod v030;
pub use v030::V030Handshaker;

mod v032;
pub use v032::V032Handshaker;

/// Inputs shared by every versioned handshaker.
#[derive(Clone)]
pub struct HandshakeContext {
    pub status: Arc<dyn StatusProvider>,
    /// Hard deadline for the whole exchange.
    pub deadline: Instant,
}

impl std::fmt::Debug for HandshakeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeContext")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Version specific half of the handshake.
///
/// Implementations observe [`HandshakeContext::deadline`] for their own reads and writes.
#[async_trait]
pub trait VersionedHandshaker: Send {
    fn version(&self) -> P2PVersion;

    /// Dialling side: send the local status first, then receive the remote one.
    async fn do_for_outbound(&mut self) -> Result<Status, HandshakeError>;

    /// Accepting side: receive and validate the remote status before answering.
    async fn do_for_inbound(&mut self) -> Result<Status, HandshakeError>;

    /// Message channel to use once the handshake succeeded.
    fn into_msg_rw(self: Box<Self>) -> Box<dyn MsgReadWriter>;
}

pub(crate) async fn within<T, F>(deadline: Instant, fut: F) -> Result<T, HandshakeError>
where
    F: Future<Output = Result<T, HandshakeError>>,
{
    tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| HandshakeError::Timeout)?
}
