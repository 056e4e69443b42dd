//! Seams between the peer manager and its collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use aster_net_handshake::{BoxedStream, MsgReadWriter};
use aster_net_primitives::{BlockRef, Message, NetAddress, PeerId, PeerMeta, PeerRole, Status};
use auto_impl::auto_impl;

use crate::{PeerManagerError, PeerRemover};

/// A connected, registered peer with its own run loop.
pub trait RemotePeer: Send + Sync + 'static {
    fn id(&self) -> PeerId {
        self.meta().id
    }

    fn meta(&self) -> &PeerMeta;

    /// Sequence number of the connection attempt this peer was created from.
    fn manage_num(&self) -> u32;

    fn role(&self) -> PeerRole {
        self.meta().role
    }

    /// Log-friendly name.
    fn name(&self) -> String {
        format!("{}#{}", self.meta().id.short(), self.manage_num())
    }

    /// Latest block the peer announced.
    fn last_status(&self) -> BlockRef;

    /// Start the run loop. Calls after the first are ignored.
    fn run_peer(&self);

    /// Ask the run loop to exit. Idempotent.
    fn stop(&self);

    /// Queue a message for delivery.
    fn send_message(&self, msg: Message) -> Result<(), PeerManagerError>;
}

/// Builds [`RemotePeer`]s for freshly registered connections.
#[auto_impl(Arc, Box)]
pub trait PeerFactory: Send + Sync + 'static {
    fn create_remote_peer(
        &self,
        meta: PeerMeta,
        seq: u32,
        status: &Status,
        msg_rw: Box<dyn MsgReadWriter>,
        remover: PeerRemover,
    ) -> Result<Arc<dyn RemotePeer>, PeerManagerError>;
}

/// Receives every message peers deliver after the handshake.
#[auto_impl(Arc, Box)]
pub trait MessageSink: Send + Sync + 'static {
    fn on_message(&self, peer: &PeerMeta, msg: Message);
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn on_message(&self, _peer: &PeerMeta, _msg: Message) {}
}

/// Opens outbound byte streams.
#[async_trait]
pub trait NetworkTransport: Send + Sync + 'static {
    async fn dial(&self, addr: &NetAddress) -> Result<BoxedStream, PeerManagerError>;
}
