use async_trait::async_trait;
use aster_net_primitives::{Message, P2PVersion, Status, SubProtocol};
use tracing::{debug, trace};

use super::{HandshakeContext, VersionedHandshaker, within};
use crate::{BoxedStream, FramedMsgRW, HandshakeError, MsgReadWriter};

/// Validation applied to a received status against the local one.
pub(crate) type StatusCheck = fn(local: &Status, remote: &Status) -> Result<(), HandshakeError>;

pub(crate) fn check_chain(local: &Status, remote: &Status) -> Result<(), HandshakeError> {
    if local.chain_id != remote.chain_id {
        return Err(HandshakeError::ChainMismatch {
            local: local.chain_id.clone(),
            remote: remote.chain_id.clone(),
        });
    }
    Ok(())
}

/// Status exchange of protocol v0.3.0, also spoken by v0.3.1.
pub struct V030Handshaker {
    version: P2PVersion,
    ctx: HandshakeContext,
    rw: FramedMsgRW<BoxedStream>,
}

impl V030Handshaker {
    pub fn new(version: P2PVersion, ctx: HandshakeContext, stream: BoxedStream) -> Self {
        Self {
            version,
            ctx,
            rw: FramedMsgRW::new(stream),
        }
    }

    pub(crate) async fn outbound_with(
        &mut self,
        check: StatusCheck,
    ) -> Result<Status, HandshakeError> {
        let deadline = self.ctx.deadline;
        within(deadline, async {
            let local = self.ctx.status.local_status();
            self.send_status(&local).await?;
            let remote = self.receive_status().await?;
            self.verify(check, &local, &remote).await?;
            Ok(remote)
        })
        .await
    }

    pub(crate) async fn inbound_with(
        &mut self,
        check: StatusCheck,
    ) -> Result<Status, HandshakeError> {
        let deadline = self.ctx.deadline;
        within(deadline, async {
            let remote = self.receive_status().await?;
            let local = self.ctx.status.local_status();
            self.verify(check, &local, &remote).await?;
            self.send_status(&local).await?;
            Ok(remote)
        })
        .await
    }

    async fn send_status(&mut self, status: &Status) -> Result<(), HandshakeError> {
        let msg = Message::with_body(SubProtocol::STATUS_REQUEST, status)?;
        self.rw.write_msg(&msg).await
    }

    async fn receive_status(&mut self) -> Result<Status, HandshakeError> {
        let msg = self.rw.read_msg().await?;
        match msg.protocol {
            SubProtocol::STATUS_REQUEST => Ok(msg.body()?),
            SubProtocol::GO_AWAY => {
                let reason = msg
                    .body::<String>()
                    .unwrap_or_else(|_| String::from_utf8_lossy(&msg.payload).into_owned());
                Err(HandshakeError::RemoteGoAway(reason))
            }
            other => Err(HandshakeError::UnexpectedMessage(other)),
        }
    }

    async fn verify(
        &mut self,
        check: StatusCheck,
        local: &Status,
        remote: &Status,
    ) -> Result<(), HandshakeError> {
        if let Err(err) = check(local, remote) {
            self.go_away(&err.to_string()).await;
            return Err(err);
        }
        Ok(())
    }

    /// Best effort notice to the remote before the connection is dropped.
    async fn go_away(&mut self, reason: &str) {
        let msg = match Message::with_body(SubProtocol::GO_AWAY, &reason) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "failed to encode go away");
                return;
            }
        };
        if let Err(e) = self.rw.write_msg(&msg).await {
            trace!(error = %e, "go away not delivered");
        }
    }
}

#[async_trait]
impl VersionedHandshaker for V030Handshaker {
    fn version(&self) -> P2PVersion {
        self.version
    }

    async fn do_for_outbound(&mut self) -> Result<Status, HandshakeError> {
        self.outbound_with(check_chain).await
    }

    async fn do_for_inbound(&mut self) -> Result<Status, HandshakeError> {
        self.inbound_with(check_chain).await
    }

    fn into_msg_rw(self: Box<Self>) -> Box<dyn MsgReadWriter> {
        Box::new(self.rw)
    }
}
