//! One handshake attempt, run off the event loop.

use std::sync::Arc;
use std::time::Duration;

use aster_net_handshake::{BoxedStream, MsgReadWriter, WireHandshaker};
use aster_net_primitives::{Direction, PeerMeta, Status};
use tokio::sync::{OwnedSemaphorePermit, mpsc};
use tracing::{debug, trace};

use crate::{NetworkTransport, PeerManagerError};

/// A completed handshake waiting to be registered.
pub(crate) struct HandshakeResult {
    pub(crate) meta: PeerMeta,
    pub(crate) status: Status,
    pub(crate) msg_rw: Box<dyn MsgReadWriter>,
    pub(crate) seq: u32,
}

impl std::fmt::Debug for HandshakeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeResult")
            .field("peer_id", &self.meta.id)
            .field("direction", &self.meta.direction)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

/// Outcome of a connection attempt, reported after any [`HandshakeResult`] it produced.
#[derive(Debug)]
pub struct ConnWorkResult {
    /// Dial target for outbound attempts; the handshaked remote for inbound ones, unknown
    /// when an inbound handshake failed.
    pub meta: Option<PeerMeta>,
    pub result: Result<(), PeerManagerError>,
    pub inbound: bool,
    pub seq: u32,
}

#[derive(Clone)]
pub(crate) struct ConnWorker {
    pub(crate) handshaker: WireHandshaker,
    pub(crate) ttl: Duration,
    pub(crate) handshaked_tx: mpsc::Sender<HandshakeResult>,
    pub(crate) work_done_tx: mpsc::Sender<ConnWorkResult>,
}

impl ConnWorker {
    pub(crate) async fn run_outbound(
        self,
        transport: Arc<dyn NetworkTransport>,
        target: PeerMeta,
        seq: u32,
        permit: OwnedSemaphorePermit,
    ) {
        trace!(peer_id = %target.id, addr = %target.addr, seq, "dialing");
        let result = self.dial_and_handshake(transport.as_ref(), &target, seq).await;
        drop(permit);
        if let Err(e) = &result {
            debug!(peer_id = %target.id, seq, error = %e, "outbound handshake failed");
        }
        self.report(ConnWorkResult {
            meta: Some(target),
            result,
            inbound: false,
            seq,
        })
        .await;
    }

    async fn dial_and_handshake(
        &self,
        transport: &dyn NetworkTransport,
        target: &PeerMeta,
        seq: u32,
    ) -> Result<(), PeerManagerError> {
        let stream = transport.dial(&target.addr).await?;
        let handshaked = self
            .handshaker
            .handshake(stream, Direction::Outbound, Some(target.id), self.ttl)
            .await?;
        let mut meta =
            PeerMeta::from_status(&handshaked.status, Direction::Outbound, handshaked.version);
        meta.designated = target.designated;
        self.deliver(HandshakeResult {
            meta,
            status: handshaked.status,
            msg_rw: handshaked.msg_rw,
            seq,
        })
        .await
    }

    pub(crate) async fn run_inbound(
        self,
        stream: BoxedStream,
        seq: u32,
        permit: OwnedSemaphorePermit,
    ) {
        let outcome = self
            .handshaker
            .handshake(stream, Direction::Inbound, None, self.ttl)
            .await;
        drop(permit);

        let work = match outcome {
            Ok(handshaked) => {
                let meta = PeerMeta::from_status(
                    &handshaked.status,
                    Direction::Inbound,
                    handshaked.version,
                );
                let result = self
                    .deliver(HandshakeResult {
                        meta: meta.clone(),
                        status: handshaked.status,
                        msg_rw: handshaked.msg_rw,
                        seq,
                    })
                    .await;
                ConnWorkResult {
                    meta: Some(meta),
                    result,
                    inbound: true,
                    seq,
                }
            }
            Err(e) => {
                debug!(seq, error = %e, "inbound handshake failed");
                ConnWorkResult {
                    meta: None,
                    result: Err(e.into()),
                    inbound: true,
                    seq,
                }
            }
        };
        self.report(work).await;
    }

    async fn deliver(&self, result: HandshakeResult) -> Result<(), PeerManagerError> {
        self.handshaked_tx
            .send(result)
            .await
            .map_err(|_| PeerManagerError::NotRunning)
    }

    async fn report(&self, work: ConnWorkResult) {
        if self.work_done_tx.send(work).await.is_err() {
            trace!("manager gone, work result dropped");
        }
    }
}
