//! Default [`RemotePeer`] implementation and its run loop.

use std::sync::Arc;

use aster_net_handshake::MsgReadWriter;
use aster_net_primitives::{BlockRef, Message, PeerId, PeerMeta, Status, SubProtocol};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use crate::{MessageSink, PeerFactory, PeerManagerError, RemotePeer};

const OUTBOUND_QUEUE: usize = 64;

/// Handle a peer uses to ask the manager to unregister it.
#[derive(Debug, Clone)]
pub struct PeerRemover {
    tx: mpsc::UnboundedSender<(PeerId, u32)>,
}

impl PeerRemover {
    pub(crate) fn new(tx: mpsc::UnboundedSender<(PeerId, u32)>) -> Self {
        Self { tx }
    }

    /// Request removal of the connection `(id, seq)`. Ignored by the manager when a newer
    /// connection for `id` is registered.
    pub fn remove(&self, id: PeerId, seq: u32) {
        if self.tx.send((id, seq)).is_err() {
            trace!(peer_id = %id, seq, "manager gone, removal dropped");
        }
    }
}

struct RunState {
    msg_rw: Box<dyn MsgReadWriter>,
    out_rx: mpsc::Receiver<Message>,
    stop_rx: watch::Receiver<bool>,
    remover: PeerRemover,
    sink: Arc<dyn MessageSink>,
}

/// Peer backed by a handshaked message channel.
pub struct RemotePeerImpl {
    meta: PeerMeta,
    seq: u32,
    last_block: Arc<RwLock<BlockRef>>,
    out_tx: mpsc::Sender<Message>,
    stop_tx: watch::Sender<bool>,
    run: Mutex<Option<RunState>>,
}

impl RemotePeerImpl {
    pub fn new(
        meta: PeerMeta,
        seq: u32,
        status: &Status,
        msg_rw: Box<dyn MsgReadWriter>,
        remover: PeerRemover,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            meta,
            seq,
            last_block: Arc::new(RwLock::new(status.best_block)),
            out_tx,
            stop_tx,
            run: Mutex::new(Some(RunState {
                msg_rw,
                out_rx,
                stop_rx,
                remover,
                sink,
            })),
        }
    }
}

impl std::fmt::Debug for RemotePeerImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePeerImpl")
            .field("id", &self.meta.id)
            .field("seq", &self.seq)
            .field("direction", &self.meta.direction)
            .finish_non_exhaustive()
    }
}

impl RemotePeer for RemotePeerImpl {
    fn meta(&self) -> &PeerMeta {
        &self.meta
    }

    fn manage_num(&self) -> u32 {
        self.seq
    }

    fn last_status(&self) -> BlockRef {
        *self.last_block.read()
    }

    fn run_peer(&self) {
        let Some(state) = self.run.lock().take() else {
            return;
        };
        tokio::spawn(run_loop(
            self.meta.clone(),
            self.seq,
            Arc::clone(&self.last_block),
            state,
        ));
    }

    fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    fn send_message(&self, msg: Message) -> Result<(), PeerManagerError> {
        self.out_tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => PeerManagerError::PeerStopped,
            mpsc::error::TrySendError::Full(_) => PeerManagerError::Transport(
                std::io::Error::new(std::io::ErrorKind::WouldBlock, "outbound queue full"),
            ),
        })
    }
}

async fn run_loop(
    meta: PeerMeta,
    seq: u32,
    last_block: Arc<RwLock<BlockRef>>,
    state: RunState,
) {
    let RunState {
        mut msg_rw,
        mut out_rx,
        mut stop_rx,
        remover,
        sink,
    } = state;
    debug!(peer_id = %meta.id, seq, direction = %meta.direction, "peer running");

    loop {
        tokio::select! {
            biased;
            // The watch guard must not live across the write await below.
            _ = async { let _ = stop_rx.wait_for(|stopped| *stopped).await; } => break,
            Some(msg) = out_rx.recv() => {
                if let Err(e) = msg_rw.write_msg(&msg).await {
                    debug!(peer_id = %meta.id, seq, error = %e, "write failed");
                    break;
                }
            }
            read = msg_rw.read_msg() => match read {
                Ok(msg) => {
                    if msg.protocol == SubProtocol::NEW_BLOCK_NOTICE {
                        match msg.body::<BlockRef>() {
                            Ok(block) => *last_block.write() = block,
                            Err(e) => warn!(peer_id = %meta.id, error = %e, "bad block notice"),
                        }
                    }
                    sink.on_message(&meta, msg);
                }
                Err(e) => {
                    debug!(peer_id = %meta.id, seq, error = %e, "read failed");
                    break;
                }
            },
        }
    }

    drop(out_rx);
    if let Err(e) = msg_rw.close().await {
        trace!(peer_id = %meta.id, error = %e, "close failed");
    }
    debug!(peer_id = %meta.id, seq, "peer loop exited");
    remover.remove(meta.id, seq);
}

/// Builds [`RemotePeerImpl`]s that forward inbound messages to a [`MessageSink`].
#[derive(Clone)]
pub struct DefaultPeerFactory {
    sink: Arc<dyn MessageSink>,
}

impl DefaultPeerFactory {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }
}

impl std::fmt::Debug for DefaultPeerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultPeerFactory").finish_non_exhaustive()
    }
}

impl PeerFactory for DefaultPeerFactory {
    fn create_remote_peer(
        &self,
        meta: PeerMeta,
        seq: u32,
        status: &Status,
        msg_rw: Box<dyn MsgReadWriter>,
        remover: PeerRemover,
    ) -> Result<Arc<dyn RemotePeer>, PeerManagerError> {
        Ok(Arc::new(RemotePeerImpl::new(
            meta,
            seq,
            status,
            msg_rw,
            remover,
            Arc::clone(&self.sink),
        )))
    }
}
