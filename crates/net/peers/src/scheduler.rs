//! Cancellable per-peer retry timers owned by the event loop.

use std::collections::HashMap;
use std::time::Duration;

use aster_net_primitives::PeerId;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A fired timer, tagged with the generation it was scheduled under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryFired {
    pub(crate) id: PeerId,
    generation: u64,
}

/// One pending timer per peer. Rescheduling or cancelling supersedes any earlier timer,
/// and a superseded timer that already fired is rejected by [`RetryScheduler::accept`].
#[derive(Debug)]
pub(crate) struct RetryScheduler {
    timers: HashMap<PeerId, (u64, JoinHandle<()>)>,
    next_generation: u64,
    tx: mpsc::UnboundedSender<RetryFired>,
}

impl RetryScheduler {
    pub(crate) fn new(tx: mpsc::UnboundedSender<RetryFired>) -> Self {
        Self {
            timers: HashMap::new(),
            next_generation: 0,
            tx,
        }
    }

    pub(crate) fn schedule(&mut self, id: PeerId, delay: Duration) {
        self.cancel(&id);
        let generation = self.next_generation;
        self.next_generation += 1;

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(RetryFired { id, generation });
        });
        self.timers.insert(id, (generation, handle));
    }

    pub(crate) fn cancel(&mut self, id: &PeerId) {
        if let Some((_, handle)) = self.timers.remove(id) {
            handle.abort();
        }
    }

    /// Consume a fired timer. False if it was cancelled or rescheduled meanwhile.
    pub(crate) fn accept(&mut self, fired: RetryFired) -> bool {
        match self.timers.get(&fired.id) {
            Some((generation, _)) if *generation == fired.generation => {
                self.timers.remove(&fired.id);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_scheduled(&self, id: &PeerId) -> bool {
        self.timers.contains_key(id)
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.timers.drain() {
            handle.abort();
        }
    }
}

/// Exponential backoff for the `trial`th consecutive failure (1-based), with +/-20% jitter,
/// capped at `max`.
pub(crate) fn backoff_delay(trial: u32, base: Duration, max: Duration) -> Duration {
    let exp = trial.saturating_sub(1).min(16);
    let raw = base.saturating_mul(1u32 << exp).min(max);
    let jitter = rand::rng().random_range(0.8..=1.2);
    raw.mul_f64(jitter).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> PeerId {
        PeerId::from_bytes([byte; 32])
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = RetryScheduler::new(tx);

        scheduler.schedule(id(1), Duration::from_secs(5));
        assert!(scheduler.is_scheduled(&id(1)));

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.id, id(1));
        assert!(scheduler.accept(fired));
        assert!(!scheduler.is_scheduled(&id(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = RetryScheduler::new(tx);

        scheduler.schedule(id(1), Duration::from_secs(5));
        scheduler.cancel(&id(1));
        scheduler.schedule(id(2), Duration::from_secs(10));

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.id, id(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_fire_rejected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = RetryScheduler::new(tx);

        scheduler.schedule(id(1), Duration::from_secs(1));
        let stale = rx.recv().await.unwrap();
        // Rescheduled after the first timer fired but before the loop consumed it.
        scheduler.schedule(id(1), Duration::from_secs(30));

        assert!(!scheduler.accept(stale));
        assert!(scheduler.is_scheduled(&id(1)));
        let fresh = rx.recv().await.unwrap();
        assert!(scheduler.accept(fresh));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(600);

        let first = backoff_delay(1, base, max);
        assert!(first >= Duration::from_secs(4) && first <= Duration::from_secs(6));
        let third = backoff_delay(3, base, max);
        assert!(third >= Duration::from_secs(16) && third <= Duration::from_secs(24));
        assert!(backoff_delay(40, base, max) <= max);
    }
}
