//! Dial candidates that are not connected yet.

use std::collections::HashMap;

use aster_net_primitives::{PeerId, PeerMeta};
use tokio::time::Instant;

/// A peer queued for an outbound connection.
#[derive(Debug, Clone)]
pub(crate) struct WaitingPeer {
    pub(crate) meta: PeerMeta,
    /// Consecutive failed attempts.
    pub(crate) trial: u32,
    /// Earliest next dial; `None` while a retry timer owns the schedule.
    pub(crate) next_trial: Option<Instant>,
    /// Seq of the attempt in flight.
    pub(crate) in_progress: Option<u32>,
}

/// What to do with a waiting peer after its attempt finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AfterFailure {
    /// Redial after the given trial count's backoff.
    Retry { trial: u32 },
    Dropped,
}

#[derive(Debug, Default)]
pub(crate) struct WaitingPeers {
    peers: HashMap<PeerId, WaitingPeer>,
}

impl WaitingPeers {
    /// Queue `meta` for an immediate dial. A peer already waiting keeps its state, but
    /// a designated flag is never lost.
    pub(crate) fn add(&mut self, meta: PeerMeta, now: Instant) -> bool {
        if let Some(existing) = self.peers.get_mut(&meta.id) {
            existing.meta.designated |= meta.designated;
            return false;
        }
        self.peers.insert(
            meta.id,
            WaitingPeer {
                meta,
                trial: 0,
                next_trial: Some(now),
                in_progress: None,
            },
        );
        true
    }

    pub(crate) fn get(&self, id: &PeerId) -> Option<&WaitingPeer> {
        self.peers.get(id)
    }

    pub(crate) fn remove(&mut self, id: &PeerId) -> Option<WaitingPeer> {
        self.peers.remove(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.peers.len()
    }

    /// Non-designated peers with an attempt in flight; they count toward the pool target.
    pub(crate) fn dialing_ordinary(&self) -> usize {
        self.peers
            .values()
            .filter(|wp| wp.in_progress.is_some() && !wp.meta.designated)
            .count()
    }

    /// Hand the schedule of a waiting peer over to a retry timer.
    pub(crate) fn defer(&mut self, id: &PeerId) {
        if let Some(wp) = self.peers.get_mut(id) {
            wp.next_trial = None;
        }
    }

    /// Peers due for a dial at `now`, designated first, at most `budget` of the others.
    /// `skip` filters out peers that are already connected.
    pub(crate) fn due(
        &self,
        now: Instant,
        budget: usize,
        skip: impl Fn(&PeerId) -> bool,
    ) -> Vec<PeerMeta> {
        let mut ready: Vec<&WaitingPeer> = self
            .peers
            .values()
            .filter(|wp| wp.in_progress.is_none())
            .filter(|wp| wp.next_trial.is_some_and(|at| at <= now))
            .filter(|wp| !skip(&wp.meta.id))
            .collect();
        ready.sort_by_key(|wp| (!wp.meta.designated, wp.trial, wp.next_trial));

        let mut others = 0;
        ready
            .into_iter()
            .filter(|wp| {
                if wp.meta.designated {
                    return true;
                }
                others += 1;
                others <= budget
            })
            .map(|wp| wp.meta.clone())
            .collect()
    }

    pub(crate) fn mark_dialing(&mut self, id: &PeerId, seq: u32) {
        if let Some(wp) = self.peers.get_mut(id) {
            wp.in_progress = Some(seq);
        }
    }

    /// Make a peer due again, typically once its retry timer fired.
    pub(crate) fn make_due(&mut self, id: &PeerId, now: Instant) {
        if let Some(wp) = self.peers.get_mut(id) {
            wp.next_trial = Some(now);
        }
    }

    /// Record the outcome of attempt `seq`. Results of attempts other than the one in
    /// flight are ignored and yield `None`.
    pub(crate) fn on_success(&mut self, id: &PeerId, seq: u32) -> Option<WaitingPeer> {
        match self.peers.get(id) {
            Some(wp) if wp.in_progress == Some(seq) => self.peers.remove(id),
            _ => None,
        }
    }

    pub(crate) fn on_failure(&mut self, id: &PeerId, seq: u32) -> Option<AfterFailure> {
        let wp = self.peers.get_mut(id)?;
        if wp.in_progress != Some(seq) {
            return None;
        }
        if !wp.meta.designated {
            self.peers.remove(id);
            return Some(AfterFailure::Dropped);
        }
        wp.in_progress = None;
        wp.trial = wp.trial.saturating_add(1);
        wp.next_trial = None;
        Some(AfterFailure::Retry { trial: wp.trial })
    }
}
