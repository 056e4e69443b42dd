//! Peer manager metrics.

use metrics::{Counter, Gauge};

/// Peer manager metrics, recorded through the `metrics` facade.
#[derive(Clone, Debug)]
pub(crate) struct PeerManagerMetrics {
    /// Handshakes that produced a remote status
    pub(crate) handshake_succeeded_total: Counter,
    /// Handshakes that failed for any reason
    pub(crate) handshake_failed_total: Counter,
    /// Connections dropped by the simultaneous-dial tie break
    pub(crate) collision_resolved_total: Counter,
    /// Results discarded because a newer attempt superseded them
    pub(crate) stale_result_discarded_total: Counter,
    pub(crate) registered_total: Counter,
    pub(crate) removed_total: Counter,
    /// Peers currently in the registry
    pub(crate) connected: Gauge,
}

impl Default for PeerManagerMetrics {
    fn default() -> Self {
        Self {
            handshake_succeeded_total: metrics::counter!("peers.handshake.succeeded_total"),
            handshake_failed_total: metrics::counter!("peers.handshake.failed_total"),
            collision_resolved_total: metrics::counter!("peers.collision.resolved_total"),
            stale_result_discarded_total: metrics::counter!(
                "peers.stale_result.discarded_total"
            ),
            registered_total: metrics::counter!("peers.registered_total"),
            removed_total: metrics::counter!("peers.removed_total"),
            connected: metrics::gauge!("peers.connected"),
        }
    }
}

impl PeerManagerMetrics {
    pub(crate) fn set_connected(&self, count: usize) {
        self.connected.set(count as f64);
    }
}
