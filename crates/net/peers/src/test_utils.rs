//! Hand-written doubles shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use aster_net_handshake::MsgReadWriter;
use aster_net_primitives::{
    B256, BlockRef, Capabilities, ChainId, Direction, Message, NetAddress, PeerAddress, PeerId,
    PeerMeta, PeerRole, Status,
};
use parking_lot::Mutex;

use crate::{MessageSink, PeerFactory, PeerManagerError, PeerRemover, RemotePeer};

pub(crate) fn test_status(name: &[u8]) -> Status {
    Status {
        chain_id: ChainId::from_name("aster.test"),
        sender: PeerAddress {
            id: PeerId::from_public_key(name),
            addr: NetAddress::new("127.0.0.1", 7846),
        },
        best_block: BlockRef::default(),
        genesis: B256::ZERO,
        capabilities: Capabilities::NONE,
        role: PeerRole::Watcher,
        version: "0.1.0".into(),
    }
}

#[derive(Debug)]
pub(crate) struct TestPeer {
    meta: PeerMeta,
    seq: u32,
    stopped: AtomicBool,
    runs: AtomicUsize,
}

impl TestPeer {
    pub(crate) fn with_meta(meta: PeerMeta, seq: u32) -> Self {
        Self {
            meta,
            seq,
            stopped: AtomicBool::new(false),
            runs: AtomicUsize::new(0),
        }
    }

    /// Inbound, non-designated, visible peer.
    pub(crate) fn new(name: &[u8], seq: u32) -> Self {
        let mut meta = PeerMeta::new(
            PeerId::from_public_key(name),
            NetAddress::new("10.0.0.1", 7846),
        );
        meta.direction = Direction::Inbound;
        Self::with_meta(meta, seq)
    }

    pub(crate) fn outbound(name: &[u8], seq: u32) -> Self {
        let mut peer = Self::new(name, seq);
        peer.meta.direction = Direction::Outbound;
        peer
    }

    pub(crate) fn designated(mut self) -> Self {
        self.meta.designated = true;
        self
    }

    pub(crate) fn hidden(mut self) -> Self {
        self.meta.hidden = true;
        self
    }

    pub(crate) fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl RemotePeer for TestPeer {
    fn meta(&self) -> &PeerMeta {
        &self.meta
    }

    fn manage_num(&self) -> u32 {
        self.seq
    }

    fn last_status(&self) -> BlockRef {
        BlockRef::default()
    }

    fn run_peer(&self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn send_message(&self, _msg: Message) -> Result<(), PeerManagerError> {
        if self.is_stopped() {
            return Err(PeerManagerError::PeerStopped);
        }
        Ok(())
    }
}

/// Records every peer it builds; optionally fails.
#[derive(Debug, Default)]
pub(crate) struct TestFactory {
    created: Mutex<Vec<Arc<TestPeer>>>,
    fail: AtomicBool,
}

impl TestFactory {
    pub(crate) fn failing() -> Self {
        let factory = Self::default();
        factory.fail.store(true, Ordering::SeqCst);
        factory
    }

    pub(crate) fn created(&self) -> Vec<Arc<TestPeer>> {
        self.created.lock().clone()
    }

    pub(crate) fn last(&self) -> Option<Arc<TestPeer>> {
        self.created.lock().last().cloned()
    }
}

impl PeerFactory for TestFactory {
    fn create_remote_peer(
        &self,
        meta: PeerMeta,
        seq: u32,
        _status: &Status,
        _msg_rw: Box<dyn MsgReadWriter>,
        _remover: PeerRemover,
    ) -> Result<Arc<dyn RemotePeer>, PeerManagerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PeerManagerError::Factory("refused".into()));
        }
        let peer = TestPeer::with_meta(meta, seq).arc();
        self.created.lock().push(Arc::clone(&peer));
        Ok(peer)
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    messages: Mutex<Vec<(PeerId, Message)>>,
}

impl RecordingSink {
    pub(crate) fn count(&self) -> usize {
        self.messages.lock().len()
    }
}

impl MessageSink for RecordingSink {
    fn on_message(&self, peer: &PeerMeta, msg: Message) {
        self.messages.lock().push((peer.id, msg));
    }
}
