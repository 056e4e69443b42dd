use aster_net_primitives::{BlockRef, Capabilities, Status};
use auto_impl::auto_impl;
use parking_lot::RwLock;

/// Source of the status this node announces during a handshake.
#[auto_impl(&, Arc, Box)]
pub trait StatusProvider: Send + Sync {
    fn local_status(&self) -> Status;
}

/// Mutable local status shared between the chain side and the handshakers.
#[derive(Debug)]
pub struct LocalStatus {
    inner: RwLock<Status>,
}

impl LocalStatus {
    pub fn new(status: Status) -> Self {
        Self {
            inner: RwLock::new(status),
        }
    }

    pub fn update_best_block(&self, best: BlockRef) {
        self.inner.write().best_block = best;
    }

    pub fn set_no_expose(&self, no_expose: bool) {
        self.inner
            .write()
            .capabilities
            .set(Capabilities::NO_EXPOSE, no_expose);
    }
}

impl StatusProvider for LocalStatus {
    fn local_status(&self) -> Status {
        self.inner.read().clone()
    }
}
