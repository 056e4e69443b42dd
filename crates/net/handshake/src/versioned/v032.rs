use async_trait::async_trait;
use aster_net_primitives::{P2PVersion, Status};

use super::{
    HandshakeContext, VersionedHandshaker,
    v030::{V030Handshaker, check_chain},
};
use crate::{BoxedStream, HandshakeError, MsgReadWriter};

fn check_chain_and_genesis(local: &Status, remote: &Status) -> Result<(), HandshakeError> {
    check_chain(local, remote)?;
    if local.genesis != remote.genesis {
        return Err(HandshakeError::GenesisMismatch);
    }
    Ok(())
}

/// Protocol v0.3.2: the v0.3.0 exchange plus a genesis block check.
pub struct V032Handshaker {
    inner: V030Handshaker,
}

impl V032Handshaker {
    pub fn new(ctx: HandshakeContext, stream: BoxedStream) -> Self {
        Self {
            inner: V030Handshaker::new(P2PVersion::V032, ctx, stream),
        }
    }
}

#[async_trait]
impl VersionedHandshaker for V032Handshaker {
    fn version(&self) -> P2PVersion {
        P2PVersion::V032
    }

    async fn do_for_outbound(&mut self) -> Result<Status, HandshakeError> {
        self.inner.outbound_with(check_chain_and_genesis).await
    }

    async fn do_for_inbound(&mut self) -> Result<Status, HandshakeError> {
        self.inner.inbound_with(check_chain_and_genesis).await
    }

    fn into_msg_rw(self: Box<Self>) -> Box<dyn MsgReadWriter> {
        Box::new(self.inner).into_msg_rw()
    }
}
