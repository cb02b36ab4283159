//! FIFO-queued byte admission on top of [`ByteAllocator`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

use crate::domain::{ByteAllocator, BytePool, PeerId};
use crate::metrics::ThrottlerMetrics;
use crate::ports::WeightOracle;

/// A request that could not be granted on arrival.
#[derive(Debug)]
struct Waiter {
    size: u64,
    peer: PeerId,
    notify: oneshot::Sender<()>,
}

struct ByteGateState {
    allocator: ByteAllocator,
    /// Queued requests in arrival order
    waiting: BTreeMap<u64, Waiter>,
    /// Queued sequence numbers per peer. Observability only, never consulted
    /// for ordering.
    waiting_by_peer: HashMap<PeerId, Vec<u64>>,
    /// Outstanding grants per peer, oldest first, with the pool each came from
    grants: HashMap<PeerId, Vec<(u64, BytePool)>>,
    next_seq: u64,
}

impl ByteGateState {
    fn enqueue(&mut self, size: u64, peer: PeerId, notify: oneshot::Sender<()>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.waiting.insert(seq, Waiter { size, peer, notify });
        self.waiting_by_peer.entry(peer).or_default().push(seq);
        seq
    }

    fn dequeue(&mut self, seq: u64) -> Option<Waiter> {
        let waiter = self.waiting.remove(&seq)?;
        self.unindex(seq, waiter.peer);
        Some(waiter)
    }

    fn unindex(&mut self, seq: u64, peer: PeerId) {
        if let Some(seqs) = self.waiting_by_peer.get_mut(&peer) {
            seqs.retain(|s| *s != seq);
            if seqs.is_empty() {
                self.waiting_by_peer.remove(&peer);
            }
        }
    }

    fn record_grant(&mut self, peer: PeerId, size: u64, pool: BytePool) {
        self.grants.entry(peer).or_default().push((size, pool));
    }

    /// Remove the oldest outstanding grant of `size` bytes to `peer`.
    fn take_grant(&mut self, peer: PeerId, size: u64) -> Option<BytePool> {
        let grants = self.grants.get_mut(&peer)?;
        let idx = grants.iter().position(|(s, _)| *s == size)?;
        let (_, pool) = grants.remove(idx);
        if grants.is_empty() {
            self.grants.remove(&peer);
        }
        Some(pool)
    }
}

/// Blocks byte requests until the allocator can serve them, strictly in
/// arrival order.
///
/// Each arrival is first tried against the allocator directly. One that
/// cannot be granted joins the tail of a single queue shared by all peers.
/// Every release scans from the head and grants waiters until the first one
/// that still does not fit. A large request at the head therefore holds back
/// smaller ones queued behind it instead of being starved by them.
pub struct ByteGate {
    state: Mutex<ByteGateState>,
    weights: Arc<dyn WeightOracle>,
    metrics: ThrottlerMetrics,
}

impl ByteGate {
    pub fn new(
        allocator: ByteAllocator,
        weights: Arc<dyn WeightOracle>,
        metrics: ThrottlerMetrics,
    ) -> Self {
        metrics.publish_pools(&allocator, 0);
        Self {
            state: Mutex::new(ByteGateState {
                allocator,
                waiting: BTreeMap::new(),
                waiting_by_peer: HashMap::new(),
                grants: HashMap::new(),
                next_seq: 0,
            }),
            weights,
            metrics,
        }
    }

    /// Suspends until `size` bytes are reserved for `peer`.
    ///
    /// Dropping the returned future before it completes withdraws the
    /// request; no bytes stay reserved on its behalf.
    pub async fn acquire(&self, size: u64, peer: PeerId) {
        let (seq, granted) = {
            let mut state = self.state.lock();
            if let Some(pool) = self.reserve(&mut state, size, peer) {
                trace!(%peer, size, %pool, "Inbound bytes granted");
                self.metrics
                    .publish_pools(&state.allocator, state.waiting.len());
                return;
            }
            let (tx, rx) = oneshot::channel();
            let seq = state.enqueue(size, peer, tx);
            self.metrics.byte_waiters.set(state.waiting.len() as i64);
            trace!(%peer, size, seq, queued = state.waiting.len(), "Inbound bytes queued");
            (seq, rx)
        };

        let mut pending = PendingBytes {
            gate: self,
            seq,
            size,
            peer,
            armed: true,
        };
        // Senders are only dropped after a grant or by `abandon`, which
        // cannot run while this future is alive.
        let woken = granted.await.is_ok();
        debug_assert!(woken, "byte waiter {seq} dropped without a grant");
        pending.armed = false;
    }

    /// Returns `size` bytes held by `peer` and wakes queued requests that now
    /// fit, in order, stopping at the first that does not.
    ///
    /// # Panics
    /// If `peer` has no outstanding grant of exactly `size` bytes.
    pub fn release(&self, size: u64, peer: PeerId) {
        let mut state = self.state.lock();
        let Some(pool) = state.take_grant(peer, size) else {
            error!(%peer, size, "Release without matching acquire");
            panic!("peer {peer} released {size} bytes with no matching grant");
        };
        state.allocator.release(size, peer, pool);
        trace!(%peer, size, %pool, "Inbound bytes released");

        let woken = self.wake_waiters(&mut state);
        if woken > 0 {
            debug!(woken, queued = state.waiting.len(), "Woke queued inbound messages");
        }
        self.metrics
            .publish_pools(&state.allocator, state.waiting.len());
    }

    /// Number of queued requests from `peer`.
    pub fn queued_for(&self, peer: &PeerId) -> usize {
        self.state
            .lock()
            .waiting_by_peer
            .get(peer)
            .map_or(0, Vec::len)
    }

    /// Number of queued requests from all peers.
    pub fn queue_depth(&self) -> usize {
        self.state.lock().waiting.len()
    }

    /// `(weighted, at_large)` bytes currently free.
    pub fn remaining(&self) -> (u64, u64) {
        let state = self.state.lock();
        (
            state.allocator.weighted_remaining(),
            state.allocator.at_large_remaining(),
        )
    }

    /// `(weighted, at_large)` pool capacities.
    pub fn capacity(&self) -> (u64, u64) {
        let state = self.state.lock();
        (
            state.allocator.weighted_capacity(),
            state.allocator.at_large_capacity(),
        )
    }

    /// Bytes `peer` holds as `(weighted, at_large)`.
    pub fn held_by(&self, peer: &PeerId) -> (u64, u64) {
        let state = self.state.lock();
        (
            state.allocator.weighted_used(peer),
            state.allocator.at_large_used(peer),
        )
    }

    fn reserve(&self, state: &mut ByteGateState, size: u64, peer: PeerId) -> Option<BytePool> {
        let stake = self.weights.stake(&peer);
        let pool = state.allocator.try_reserve(size, peer, stake)?;
        state.record_grant(peer, size, pool);
        self.metrics.record_grant(pool);
        Some(pool)
    }

    fn wake_waiters(&self, state: &mut ByteGateState) -> usize {
        let mut woken = 0;
        while let Some((&seq, head)) = state.waiting.first_key_value() {
            let (size, peer) = (head.size, head.peer);
            let Some(pool) = self.reserve(state, size, peer) else {
                break;
            };
            trace!(%peer, size, seq, %pool, "Queued inbound bytes granted");
            if let Some(waiter) = state.dequeue(seq) {
                // A closed receiver means the waiter is being dropped; its
                // guard hands this grant back through `release`.
                let _ = waiter.notify.send(());
            }
            woken += 1;
        }
        woken
    }

    /// Withdraw a request whose future was dropped.
    fn abandon(&self, seq: u64, size: u64, peer: PeerId) {
        let mut state = self.state.lock();
        if state.dequeue(seq).is_some() {
            trace!(%peer, size, seq, "Queued inbound bytes abandoned");
            // The head may have been the only thing blocking the queue.
            self.wake_waiters(&mut state);
            self.metrics
                .publish_pools(&state.allocator, state.waiting.len());
            return;
        }
        drop(state);
        // Granted between the wake-up and the drop.
        trace!(%peer, size, seq, "Granted inbound bytes abandoned");
        self.release(size, peer);
    }
}

/// Withdraws a queued byte request if its `acquire` future is dropped.
struct PendingBytes<'a> {
    gate: &'a ByteGate,
    seq: u64,
    size: u64,
    peer: PeerId,
    armed: bool,
}

impl Drop for PendingBytes<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.gate.abandon(self.seq, self.size, self.peer);
        }
    }
}
