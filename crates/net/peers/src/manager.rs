//! Peer manager: a cloneable handle plus the single event loop that owns the registry.
//!
//! Only the event loop mutates the registry. Everything else reads the cached snapshot or
//! sends a request into the loop through a channel.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use aster_net_handshake::{
    BoxedStream, MsgReadWriter, StatusProvider, VersionManager, WireHandshaker,
};
use aster_net_primitives::{Direction, Message, PeerId, PeerMeta, SubProtocol};
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore, broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::collision::new_connection_wins;
use crate::metrics::PeerManagerMetrics;
use crate::registry::{PeerCache, PeerInfo, PeerRegistry, RegisterResult, SharedCache};
use crate::scheduler::{RetryFired, RetryScheduler, backoff_delay};
use crate::state::{ManagerStatus, StatusCell, StopTransition};
use crate::waiting::{AfterFailure, WaitingPeers};
use crate::worker::{ConnWorkResult, ConnWorker, HandshakeResult};
use crate::{
    EventEmitter, NetworkTransport, PeerEvent, PeerFactory, PeerManagerConfig, PeerManagerError,
    PeerRemover, RemotePeer,
};

const INBOUND_QUEUE: usize = 32;
const RESULT_QUEUE: usize = 32;
const FILL_POOL_QUEUE: usize = 8;
const GO_AWAY_TIMEOUT: Duration = Duration::from_secs(2);

struct InboundConn {
    stream: BoxedStream,
    remote: Option<SocketAddr>,
}

/// State both the handle and the event loop see.
struct Shared {
    local_id: PeerId,
    status: Arc<dyn StatusProvider>,
    lifecycle: StatusCell,
    cache: SharedCache,
    events: EventEmitter,
    metrics: PeerManagerMetrics,
    stopped: Notify,
}

struct Inner {
    shared: Arc<Shared>,
    inbound_tx: mpsc::Sender<InboundConn>,
    fill_pool_tx: mpsc::Sender<Vec<PeerMeta>>,
    remove_tx: mpsc::UnboundedSender<(PeerId, u32)>,
    finish_tx: watch::Sender<bool>,
    /// Present until [`PeerManager::start`] spawns it.
    event_loop: Mutex<Option<EventLoop>>,
}

/// Handle to the peer manager. Cheap to clone; all clones drive the same manager.
#[derive(Clone)]
pub struct PeerManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PeerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerManager")
            .field("local_id", &self.inner.shared.local_id)
            .field("status", &self.status())
            .field("peers", &self.inner.shared.cache.load().len())
            .finish()
    }
}

impl PeerManager {
    /// Validate `config` and build a manager in the `initial` state.
    pub fn new(
        config: PeerManagerConfig,
        status: Arc<dyn StatusProvider>,
        transport: Arc<dyn NetworkTransport>,
        factory: Arc<dyn PeerFactory>,
    ) -> Result<Self, PeerManagerError> {
        let local_id = status.local_status().sender.id;
        config.validate(&local_id)?;

        let versions = Arc::new(VersionManager::new(
            config.versions.clone(),
            Arc::clone(&status),
        ));
        let handshaker = WireHandshaker::new(config.network.magic(), local_id, versions);

        let shared = Arc::new(Shared {
            local_id,
            status,
            lifecycle: StatusCell::new(ManagerStatus::Initial),
            cache: SharedCache::default(),
            events: EventEmitter::default(),
            metrics: PeerManagerMetrics::default(),
            stopped: Notify::new(),
        });

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let (fill_pool_tx, fill_pool_rx) = mpsc::channel(FILL_POOL_QUEUE);
        let (remove_tx, remove_rx) = mpsc::unbounded_channel();
        let (finish_tx, finish_rx) = watch::channel(false);
        let (handshaked_tx, handshaked_rx) = mpsc::channel(RESULT_QUEUE);
        let (work_done_tx, work_done_rx) = mpsc::channel(RESULT_QUEUE);
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();

        let designated = config
            .designated_peers
            .iter()
            .map(|p| (p.id, p.meta()))
            .collect();
        let hidden = config.hidden_peers.iter().copied().collect();

        let event_loop = EventLoop {
            shared: Arc::clone(&shared),
            registry: PeerRegistry::default(),
            waiting: WaitingPeers::default(),
            scheduler: RetryScheduler::new(retry_tx),
            designated,
            hidden,
            worker: ConnWorker {
                handshaker,
                ttl: config.handshake_timeout(),
                handshaked_tx,
                work_done_tx,
            },
            transport,
            factory,
            remover: PeerRemover::new(remove_tx.clone()),
            permits: Arc::new(Semaphore::new(config.max_pending_handshakes.max(1))),
            tasks: JoinSet::new(),
            next_seq: 0,
            outbound: HashMap::new(),
            config,
            inbound_rx,
            handshaked_rx,
            work_done_rx,
            remove_rx,
            fill_pool_rx,
            retry_rx,
            finish_rx,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                shared,
                inbound_tx,
                fill_pool_tx,
                remove_tx,
                finish_tx,
                event_loop: Mutex::new(Some(event_loop)),
            }),
        })
    }

    /// `initial -> running`: spawn the event loop on the current runtime.
    pub fn start(&self) -> Result<(), PeerManagerError> {
        let shared = &self.inner.shared;
        if !shared
            .lifecycle
            .transition(ManagerStatus::Initial, ManagerStatus::Running)
        {
            return Err(match shared.lifecycle.load() {
                ManagerStatus::Running => PeerManagerError::AlreadyStarted,
                _ => PeerManagerError::NotRunning,
            });
        }
        let Some(event_loop) = self.inner.event_loop.lock().take() else {
            return Err(PeerManagerError::AlreadyStarted);
        };
        info!(local_id = %shared.local_id, "starting peer manager");
        tokio::spawn(event_loop.run());
        Ok(())
    }

    /// Request shutdown. Safe to call any number of times from any task; only the call
    /// that moves a running manager into `stopping` signals the event loop.
    pub fn stop(&self) {
        match self.inner.shared.lifecycle.begin_stop() {
            StopTransition::Signal => {
                info!("stopping peer manager");
                self.inner.finish_tx.send_replace(true);
            }
            StopTransition::Quiet => debug!("peer manager stopped before start"),
            StopTransition::NoOp => trace!("peer manager already stopping"),
        }
    }

    /// Resolve once the event loop has shut down. Returns at once for a manager that was
    /// never started.
    pub async fn wait_stopped(&self) {
        loop {
            let notified = self.inner.shared.stopped.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let never_started = self.inner.event_loop.lock().is_some();
            if never_started || self.status() == ManagerStatus::Stopped {
                return;
            }
            notified.await;
        }
    }

    pub fn status(&self) -> ManagerStatus {
        self.inner.shared.lifecycle.load()
    }

    pub fn local_id(&self) -> PeerId {
        self.inner.shared.local_id
    }

    pub fn get_peer(&self, id: &PeerId) -> Option<Arc<dyn RemotePeer>> {
        self.inner.shared.cache.load().get(id)
    }

    pub fn get_peers(&self) -> Vec<Arc<dyn RemotePeer>> {
        self.inner.shared.cache.load().peers()
    }

    /// Current registry snapshot.
    pub fn snapshot(&self) -> Arc<PeerCache> {
        self.inner.shared.cache.load()
    }

    /// Address records of connected peers, hidden ones only if `include_hidden`, plus the
    /// local node if `include_self`.
    pub fn get_peer_addresses(&self, include_hidden: bool, include_self: bool) -> Vec<PeerInfo> {
        let mut infos = self.inner.shared.cache.load().infos(include_hidden);
        if include_self {
            infos.push(PeerInfo::local(&self.inner.shared.status.local_status()));
        }
        infos
    }

    /// Queue a discovered peer for an outbound connection.
    pub fn add_new_peer(&self, meta: PeerMeta) -> Result<(), PeerManagerError> {
        self.fill_pool(vec![meta])
    }

    /// Queue candidates for pool fill. A full queue drops the batch; discovery supplies
    /// candidates again on its next round.
    pub fn fill_pool(&self, metas: Vec<PeerMeta>) -> Result<(), PeerManagerError> {
        if self.status().is_terminating() {
            return Err(PeerManagerError::NotRunning);
        }
        match self.inner.fill_pool_tx.try_send(metas) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(metas)) => {
                debug!(dropped = metas.len(), "pool fill queue full");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PeerManagerError::NotRunning),
        }
    }

    /// Ask the loop to unregister and stop `id`. False if it is not connected.
    pub fn remove_peer(&self, id: &PeerId) -> bool {
        let Some(peer) = self.get_peer(id) else {
            return false;
        };
        self.inner.remove_tx.send((*id, peer.manage_num())).is_ok()
    }

    /// Hand over an accepted inbound stream. Dropped (and so closed) when the queue is full.
    pub fn on_connect(
        &self,
        stream: BoxedStream,
        remote: Option<SocketAddr>,
    ) -> Result<(), PeerManagerError> {
        if !self.status().is_running() {
            return Err(PeerManagerError::NotRunning);
        }
        match self.inner.inbound_tx.try_send(InboundConn { stream, remote }) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(PeerManagerError::Transport(
                std::io::Error::new(std::io::ErrorKind::WouldBlock, "inbound queue full"),
            )),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PeerManagerError::NotRunning),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PeerEvent> {
        self.inner.shared.events.subscribe()
    }
}

/// Owns the registry and every piece of state only the loop may touch.
struct EventLoop {
    shared: Arc<Shared>,
    config: PeerManagerConfig,
    registry: PeerRegistry,
    waiting: WaitingPeers,
    scheduler: RetryScheduler,
    designated: HashMap<PeerId, PeerMeta>,
    hidden: HashSet<PeerId>,
    worker: ConnWorker,
    transport: Arc<dyn NetworkTransport>,
    factory: Arc<dyn PeerFactory>,
    remover: PeerRemover,
    permits: Arc<Semaphore>,
    /// Handshake workers and go-away senders; aborted on shutdown.
    tasks: JoinSet<()>,
    next_seq: u32,
    /// Outbound attempts per peer, kept until the last one in flight settles.
    outbound: HashMap<PeerId, OutboundAttempts>,

    inbound_rx: mpsc::Receiver<InboundConn>,
    handshaked_rx: mpsc::Receiver<HandshakeResult>,
    work_done_rx: mpsc::Receiver<ConnWorkResult>,
    remove_rx: mpsc::UnboundedReceiver<(PeerId, u32)>,
    fill_pool_rx: mpsc::Receiver<Vec<PeerMeta>>,
    retry_rx: mpsc::UnboundedReceiver<RetryFired>,
    finish_rx: watch::Receiver<bool>,
}

/// Outbound attempts dispatched to one peer.
#[derive(Debug, Default, Clone, Copy)]
struct OutboundAttempts {
    /// Seq of the newest attempt.
    latest: u32,
    in_flight: usize,
}

impl EventLoop {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.pool_check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // Completed handshakes are polled before their work results, so a result is
            // always registered before its attempt is settled.
            tokio::select! {
                biased;

                _ = self.finish_rx.changed() => break,
                Some(result) = self.handshaked_rx.recv() => self.on_handshaked(result),
                Some(done) = self.work_done_rx.recv() => self.on_work_done(done),
                Some((id, seq)) = self.remove_rx.recv() => self.on_remove(id, seq),
                Some(conn) = self.inbound_rx.recv() => self.on_inbound(conn),
                Some(metas) = self.fill_pool_rx.recv() => self.on_fill_pool(metas),
                Some(fired) = self.retry_rx.recv() => self.on_retry(fired),
                _ = ticker.tick() => self.check_and_connect(),
                Some(_) = self.tasks.join_next(), if !self.tasks.is_empty() => {}
            }
        }

        self.shutdown();
    }

    fn next_seq(&mut self) -> u32 {
        self.next_seq = self.next_seq.wrapping_add(1);
        self.next_seq
    }

    fn on_inbound(&mut self, conn: InboundConn) {
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            debug!(remote = ?conn.remote, "too many pending handshakes, closing inbound");
            return;
        };
        let seq = self.next_seq();
        trace!(remote = ?conn.remote, seq, "inbound connection");
        let worker = self.worker.clone();
        self.tasks.spawn(worker.run_inbound(conn.stream, seq, permit));
    }

    fn on_fill_pool(&mut self, metas: Vec<PeerMeta>) {
        let now = Instant::now();
        let mut added = 0usize;
        for mut meta in metas {
            if meta.id == self.shared.local_id || self.registry.contains(&meta.id) {
                continue;
            }
            meta.designated = self.designated.contains_key(&meta.id);
            if self.waiting.add(meta, now) {
                added += 1;
            }
        }
        trace!(added, waiting = self.waiting.len(), "pool fill");
        self.check_and_connect();
    }

    fn on_retry(&mut self, fired: RetryFired) {
        if !self.scheduler.accept(fired) {
            trace!(peer_id = %fired.id, "superseded retry timer");
            return;
        }
        self.waiting.make_due(&fired.id, Instant::now());
        self.check_and_connect();
    }

    /// Dial due waiting peers: every designated one, and ordinary ones until the outbound
    /// pool reaches its target.
    fn check_and_connect(&mut self) {
        let now = Instant::now();
        let missing: Vec<PeerMeta> = self
            .designated
            .values()
            .filter(|meta| !self.registry.contains(&meta.id))
            .filter(|meta| self.waiting.get(&meta.id).is_none())
            .cloned()
            .collect();
        for meta in missing {
            self.waiting.add(meta, now);
        }

        let pending = self.registry.outbound_count() + self.waiting.dialing_ordinary();
        let budget = self.config.pool_target.saturating_sub(pending);
        let registry = &self.registry;
        let due = self.waiting.due(now, budget, |id| registry.contains(id));
        for meta in due {
            if !self.dial(meta) {
                trace!("handshake slots exhausted");
                break;
            }
        }
    }

    fn dial(&mut self, target: PeerMeta) -> bool {
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            return false;
        };
        let seq = self.next_seq();
        let attempts = self.outbound.entry(target.id).or_default();
        attempts.latest = seq;
        attempts.in_flight += 1;
        self.waiting.mark_dialing(&target.id, seq);
        let worker = self.worker.clone();
        let transport = Arc::clone(&self.transport);
        self.tasks
            .spawn(worker.run_outbound(transport, target, seq, permit));
        true
    }

    /// Seq of a newer outbound attempt for `id`, if `seq` has been superseded.
    fn superseded_by(&self, id: &PeerId, seq: u32) -> Option<u32> {
        self.outbound
            .get(id)
            .map(|attempts| attempts.latest)
            .filter(|latest| *latest > seq)
    }

    /// Account for a finished outbound attempt. The entry goes once nothing is in flight,
    /// as no older result can arrive after that.
    fn settle_outbound(&mut self, id: &PeerId) {
        if let Some(attempts) = self.outbound.get_mut(id) {
            attempts.in_flight = attempts.in_flight.saturating_sub(1);
            if attempts.in_flight == 0 {
                self.outbound.remove(id);
            }
        }
    }

    fn on_handshaked(&mut self, result: HandshakeResult) {
        if result.meta.is_outbound()
            && let Some(latest) = self.superseded_by(&result.meta.id, result.seq)
        {
            let err = PeerManagerError::StaleResult {
                seq: result.seq,
                latest,
            };
            debug!(peer_id = %result.meta.id, error = %err, "discarding handshake");
            self.shared.metrics.stale_result_discarded_total.increment(1);
            self.go_away(result.msg_rw, &err);
            return;
        }
        self.shared.metrics.handshake_succeeded_total.increment(1);
        let _ = self.try_register(result);
    }

    /// Register a handshaked connection, resolving a collision with an existing one.
    /// `None` when the connection was rejected; its socket is then closed.
    fn try_register(&mut self, result: HandshakeResult) -> Option<Arc<dyn RemotePeer>> {
        let HandshakeResult {
            mut meta,
            status,
            msg_rw,
            seq,
        } = result;
        let id = meta.id;
        meta.designated = self.designated.contains_key(&id);
        meta.hidden = self.hidden.contains(&id) || status.no_expose();
        let direction = meta.direction;

        if let Some(existing) = self.registry.get(&id) {
            if existing.manage_num() == seq {
                let err = PeerManagerError::DuplicateRegistration(id);
                warn!(peer_id = %id, seq, error = %err, "rejecting peer");
                self.go_away(msg_rw, &err);
                return None;
            }
            if !new_connection_wins(&self.shared.local_id, &id, direction) {
                let kept = existing.meta().direction;
                debug!(peer_id = %id, seq, %direction, %kept, "collision, keeping existing connection");
                self.shared.metrics.collision_resolved_total.increment(1);
                self.shared.events.collision_resolved(id, kept);
                self.go_away(msg_rw, &PeerManagerError::CollisionResolved);
                return None;
            }
        } else if !meta.designated && self.registry.non_designated_count() >= self.config.max_peers
        {
            let err = PeerManagerError::RegistryFull {
                max: self.config.max_peers,
            };
            debug!(peer_id = %id, seq, error = %err, "rejecting peer");
            self.go_away(msg_rw, &err);
            return None;
        }

        let peer = match self.factory.create_remote_peer(
            meta,
            seq,
            &status,
            msg_rw,
            self.remover.clone(),
        ) {
            Ok(peer) => peer,
            Err(e) => {
                warn!(peer_id = %id, seq, error = %e, "failed to create remote peer");
                return None;
            }
        };

        if let RegisterResult::Replaced { old } = self.registry.register(Arc::clone(&peer)) {
            debug!(
                peer_id = %id,
                old_seq = old.manage_num(),
                seq,
                kept = %direction,
                "collision, replacing existing connection"
            );
            self.shared.metrics.collision_resolved_total.increment(1);
            self.shared.events.collision_resolved(id, direction);
            old.stop();
        }
        self.waiting.remove(&id);
        self.scheduler.cancel(&id);
        peer.run_peer();
        self.update_peer_cache();

        let meta = peer.meta();
        info!(
            peer_id = %id,
            seq,
            %direction,
            addr = %meta.addr,
            designated = meta.designated,
            hidden = meta.hidden,
            "peer registered"
        );
        self.shared.metrics.registered_total.increment(1);
        self.shared.events.peer_connected(meta.clone());
        Some(peer)
    }

    fn on_work_done(&mut self, done: ConnWorkResult) {
        let ConnWorkResult {
            meta,
            result,
            inbound,
            seq,
        } = done;

        if !inbound && let Some(meta) = &meta {
            let superseded = self.superseded_by(&meta.id, seq);
            self.settle_outbound(&meta.id);
            if let Some(latest) = superseded {
                trace!(peer_id = %meta.id, seq, latest, "ignoring superseded work result");
                self.shared.metrics.stale_result_discarded_total.increment(1);
                return;
            }
        }

        if let Err(e) = &result {
            self.shared.metrics.handshake_failed_total.increment(1);
            let direction = if inbound {
                Direction::Inbound
            } else {
                Direction::Outbound
            };
            let id = meta.as_ref().map(|m| m.id);
            self.shared
                .events
                .handshake_failed(id, direction, e.to_string());
        }

        let Some(meta) = meta.filter(|_| !inbound) else {
            return;
        };

        match result {
            Ok(()) => {
                self.waiting.on_success(&meta.id, seq);
            }
            Err(_) => match self.waiting.on_failure(&meta.id, seq) {
                Some(AfterFailure::Retry { trial }) => {
                    let delay =
                        backoff_delay(trial, self.config.retry_base(), self.config.retry_max());
                    debug!(peer_id = %meta.id, trial, ?delay, "redialing designated peer later");
                    self.scheduler.schedule(meta.id, delay);
                }
                Some(AfterFailure::Dropped) | None => {}
            },
        }
        self.check_and_connect();
    }

    fn on_remove(&mut self, id: PeerId, seq: u32) {
        let Some(peer) = self.registry.remove_if_current(&id, seq) else {
            trace!(peer_id = %id, seq, "ignoring removal of superseded connection");
            return;
        };
        peer.stop();
        self.update_peer_cache();
        info!(peer_id = %id, seq, "peer removed");
        self.shared.metrics.removed_total.increment(1);
        self.shared.events.peer_disconnected(id);

        if let Some(meta) = self.designated.get(&id).cloned() {
            self.waiting.add(meta, Instant::now());
            self.waiting.defer(&id);
            self.scheduler.schedule(id, self.config.retry_base());
        }
    }

    /// Best effort notice before dropping a rejected connection.
    fn go_away(&mut self, mut msg_rw: Box<dyn MsgReadWriter>, reason: &PeerManagerError) {
        let reason = reason.to_string();
        self.tasks.spawn(async move {
            match Message::with_body(SubProtocol::GO_AWAY, &reason) {
                Ok(msg) => {
                    if tokio::time::timeout(GO_AWAY_TIMEOUT, msg_rw.write_msg(&msg))
                        .await
                        .is_err()
                    {
                        trace!("go away timed out");
                    }
                }
                Err(e) => debug!(error = %e, "failed to encode go away"),
            }
            let _ = msg_rw.close().await;
        });
    }

    fn update_peer_cache(&self) {
        self.shared.cache.store(self.registry.snapshot());
        self.shared.metrics.set_connected(self.registry.len());
    }

    fn shutdown(mut self) {
        self.scheduler.cancel_all();
        // In-flight handshakes fail on their dropped sockets.
        self.tasks.abort_all();
        self.handshaked_rx.close();
        while let Ok(result) = self.handshaked_rx.try_recv() {
            trace!(?result, "dropping unregistered handshake");
        }

        let peers: Vec<_> = self.registry.drain().collect();
        for peer in &peers {
            peer.stop();
            self.shared.events.peer_disconnected(peer.id());
        }
        self.update_peer_cache();

        self.shared.lifecycle.store(ManagerStatus::Stopped);
        self.shared.stopped.notify_waiters();
        info!(stopped_peers = peers.len(), "peer manager stopped");
    }
}
