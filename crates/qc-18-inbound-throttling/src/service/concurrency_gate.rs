//! Per-peer cap on messages being processed at once.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{error, trace};

use crate::domain::PeerId;
use crate::metrics::ThrottlerMetrics;

#[derive(Debug, Default)]
struct SlotState {
    /// Admitted and not yet released, per peer. Absent means zero.
    in_flight: HashMap<PeerId, u64>,
    /// Requests waiting for a slot, per peer, oldest first
    waiting: HashMap<PeerId, VecDeque<(u64, oneshot::Sender<()>)>>,
    next_seq: u64,
}

impl SlotState {
    fn waiter_count(&self) -> usize {
        self.waiting.values().map(VecDeque::len).sum()
    }
}

/// Counting semaphore per peer.
///
/// Bounds how many messages from one peer can be mid-processing no matter
/// how small they are, so a flood of tiny messages cannot tie up the node
/// even while byte capacity is plentiful. Peers never wait on each other.
pub struct ConcurrencyGate {
    max_per_peer: u64,
    state: Mutex<SlotState>,
    metrics: ThrottlerMetrics,
}

impl ConcurrencyGate {
    pub fn new(max_per_peer: u64, metrics: ThrottlerMetrics) -> Self {
        Self {
            max_per_peer,
            state: Mutex::new(SlotState::default()),
            metrics,
        }
    }

    /// Suspends until `peer` has fewer than the maximum messages in flight,
    /// then takes a slot.
    ///
    /// Dropping the returned future before it completes withdraws the
    /// request.
    pub async fn acquire(&self, peer: PeerId) {
        let (seq, granted) = {
            let mut state = self.state.lock();
            let count = state.in_flight.entry(peer).or_insert(0);
            if *count < self.max_per_peer {
                *count += 1;
                self.metrics.msgs_in_flight.inc();
                return;
            }
            let (tx, rx) = oneshot::channel();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.waiting.entry(peer).or_default().push_back((seq, tx));
            self.metrics.buffer_waiters.inc();
            trace!(%peer, seq, max = self.max_per_peer, "Inbound message waiting for slot");
            (seq, rx)
        };

        let mut pending = PendingSlot {
            gate: self,
            seq,
            peer,
            armed: true,
        };
        let woken = granted.await.is_ok();
        debug_assert!(woken, "slot waiter {seq} dropped without a slot");
        pending.armed = false;
    }

    /// Frees one of `peer`'s slots, handing it straight to the peer's oldest
    /// waiter if there is one.
    ///
    /// # Panics
    /// If `peer` has no message in flight.
    pub fn release(&self, peer: PeerId) {
        let mut state = self.state.lock();
        let held = state.in_flight.get(&peer).copied().unwrap_or(0);
        if held == 0 {
            error!(%peer, "Slot release without matching acquire");
            panic!("peer {peer} released a processing slot it does not hold");
        }

        if let Some(queue) = state.waiting.get_mut(&peer) {
            let next = queue.pop_front();
            if queue.is_empty() {
                state.waiting.remove(&peer);
            }
            if let Some((seq, notify)) = next {
                self.metrics.buffer_waiters.dec();
                trace!(%peer, seq, "Processing slot handed to waiter");
                // A closed receiver means the waiter is being dropped; its
                // guard gives the slot back through `release`.
                let _ = notify.send(());
                return;
            }
        }

        if held == 1 {
            state.in_flight.remove(&peer);
        } else {
            state.in_flight.insert(peer, held - 1);
        }
        self.metrics.msgs_in_flight.dec();
    }

    /// Messages from `peer` currently holding a slot.
    pub fn in_flight(&self, peer: &PeerId) -> u64 {
        self.state.lock().in_flight.get(peer).copied().unwrap_or(0)
    }

    /// Messages from all peers currently holding a slot.
    pub fn total_in_flight(&self) -> u64 {
        self.state.lock().in_flight.values().sum()
    }

    /// Requests from all peers waiting for a slot.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiter_count()
    }

    pub fn max_per_peer(&self) -> u64 {
        self.max_per_peer
    }

    /// Withdraw a slot request whose future was dropped.
    fn abandon(&self, seq: u64, peer: PeerId) {
        let mut state = self.state.lock();
        if let Some(queue) = state.waiting.get_mut(&peer) {
            if let Some(idx) = queue.iter().position(|(s, _)| *s == seq) {
                queue.remove(idx);
                if queue.is_empty() {
                    state.waiting.remove(&peer);
                }
                self.metrics.buffer_waiters.dec();
                trace!(%peer, seq, "Slot request abandoned");
                return;
            }
        }
        drop(state);
        // Handed a slot between the wake-up and the drop.
        self.release(peer);
    }
}

/// Withdraws a queued slot request if its `acquire` future is dropped.
struct PendingSlot<'a> {
    gate: &'a ConcurrencyGate,
    seq: u64,
    peer: PeerId,
    armed: bool,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.gate.abandon(self.seq, self.peer);
        }
    }
}
