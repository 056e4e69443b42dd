//! Peer events and non-blocking broadcast emitter.

use aster_net_primitives::{Direction, PeerId, PeerMeta};
use tokio::sync::broadcast;

/// Peer manager events.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    Connected {
        meta: PeerMeta,
    },
    Disconnected {
        id: PeerId,
    },
    HandshakeFailed {
        /// Unknown when an inbound handshake failed before the remote identified itself.
        id: Option<PeerId>,
        direction: Direction,
        reason: String,
    },
    /// A simultaneous dial was settled; `kept` is the direction of the surviving connection.
    CollisionResolved {
        id: PeerId,
        kept: Direction,
    },
}

impl PeerEvent {
    pub fn peer_id(&self) -> Option<PeerId> {
        match self {
            Self::Connected { meta } => Some(meta.id),
            Self::Disconnected { id } | Self::CollisionResolved { id, .. } => Some(*id),
            Self::HandshakeFailed { id, .. } => *id,
        }
    }

    pub fn is_connection_event(&self) -> bool {
        matches!(self, Self::Connected { .. } | Self::Disconnected { .. })
    }
}

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Non-blocking broadcast emitter. Slow subscribers drop events independently.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<PeerEvent>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: PeerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventEmitter {
    pub fn peer_connected(&self, meta: PeerMeta) {
        self.emit(PeerEvent::Connected { meta });
    }

    pub fn peer_disconnected(&self, id: PeerId) {
        self.emit(PeerEvent::Disconnected { id });
    }

    pub fn handshake_failed(&self, id: Option<PeerId>, direction: Direction, reason: String) {
        self.emit(PeerEvent::HandshakeFailed {
            id,
            direction,
            reason,
        });
    }

    pub fn collision_resolved(&self, id: PeerId, kept: Direction) {
        self.emit(PeerEvent::CollisionResolved { id, kept });
    }
}
