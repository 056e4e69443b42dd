//! Live peer registry and the read-optimised snapshot served to other components.

use std::collections::HashMap;
use std::sync::Arc;

use aster_net_primitives::{BlockRef, Direction, NetAddress, PeerId, PeerRole, Status};
use parking_lot::RwLock;
use serde::Serialize;

use crate::RemotePeer;

/// Result of a peer registration.
pub(crate) enum RegisterResult {
    New,
    /// Old connection should be stopped.
    Replaced { old: Arc<dyn RemotePeer> },
}

impl std::fmt::Debug for RegisterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => f.write_str("New"),
            Self::Replaced { old } => f
                .debug_struct("Replaced")
                .field("old", &old.name())
                .finish(),
        }
    }
}

/// PeerId to running peer map. Owned and mutated by the manager's event loop only.
#[derive(Default)]
pub(crate) struct PeerRegistry {
    peers: HashMap<PeerId, Arc<dyn RemotePeer>>,
}

impl PeerRegistry {
    pub(crate) fn get(&self, id: &PeerId) -> Option<&Arc<dyn RemotePeer>> {
        self.peers.get(id)
    }

    pub(crate) fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    /// Insert `peer`, handing back whatever it displaced.
    pub(crate) fn register(&mut self, peer: Arc<dyn RemotePeer>) -> RegisterResult {
        match self.peers.insert(peer.id(), peer) {
            Some(old) => RegisterResult::Replaced { old },
            None => RegisterResult::New,
        }
    }

    /// Remove the peer only if it is still the connection identified by `seq`.
    pub(crate) fn remove_if_current(&mut self, id: &PeerId, seq: u32) -> Option<Arc<dyn RemotePeer>> {
        match self.peers.get(id) {
            Some(peer) if peer.manage_num() == seq => self.peers.remove(id),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.peers.len()
    }

    /// Peers counted against `max_peers`.
    pub(crate) fn non_designated_count(&self) -> usize {
        self.peers.values().filter(|p| !p.meta().designated).count()
    }

    /// Non-designated outbound connections, the ones pool fill tops up.
    pub(crate) fn outbound_count(&self) -> usize {
        self.peers
            .values()
            .filter(|p| p.meta().is_outbound() && !p.meta().designated)
            .count()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Arc<dyn RemotePeer>> + '_ {
        self.peers.drain().map(|(_, peer)| peer)
    }

    pub(crate) fn snapshot(&self) -> PeerCache {
        PeerCache {
            peers: self.peers.clone(),
        }
    }
}

/// Immutable snapshot of the registry.
#[derive(Default, Clone)]
pub struct PeerCache {
    peers: HashMap<PeerId, Arc<dyn RemotePeer>>,
}

impl PeerCache {
    pub fn get(&self, id: &PeerId) -> Option<Arc<dyn RemotePeer>> {
        self.peers.get(id).cloned()
    }

    pub fn peers(&self) -> Vec<Arc<dyn RemotePeer>> {
        self.peers.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn infos(&self, include_hidden: bool) -> Vec<PeerInfo> {
        self.peers
            .values()
            .filter(|p| include_hidden || !p.meta().hidden)
            .map(|p| PeerInfo::from_peer(p.as_ref()))
            .collect()
    }
}

impl std::fmt::Debug for PeerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerCache")
            .field("peers", &self.peers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Whole-snapshot swap point between the event loop and readers.
#[derive(Debug, Default)]
pub(crate) struct SharedCache {
    current: RwLock<Arc<PeerCache>>,
}

impl SharedCache {
    pub(crate) fn load(&self) -> Arc<PeerCache> {
        Arc::clone(&self.current.read())
    }

    pub(crate) fn store(&self, cache: PeerCache) {
        *self.current.write() = Arc::new(cache);
    }
}

/// Address record shared with other nodes and the local API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addr: NetAddress,
    pub hidden: bool,
    pub is_self: bool,
    /// `None` for the local node.
    pub direction: Option<Direction>,
    pub role: PeerRole,
    pub version: String,
    pub last_block: BlockRef,
}

impl PeerInfo {
    pub(crate) fn from_peer(peer: &dyn RemotePeer) -> Self {
        let meta = peer.meta();
        Self {
            id: meta.id,
            addr: meta.addr.clone(),
            hidden: meta.hidden,
            is_self: false,
            direction: Some(meta.direction),
            role: meta.role,
            version: meta.version.clone(),
            last_block: peer.last_status(),
        }
    }

    pub(crate) fn local(status: &Status) -> Self {
        Self {
            id: status.sender.id,
            addr: status.sender.addr.clone(),
            hidden: status.no_expose(),
            is_self: true,
            direction: None,
            role: status.role,
            version: status.version.clone(),
            last_block: status.best_block,
        }
    }
}
