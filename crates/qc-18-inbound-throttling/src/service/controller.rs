//! The composite throttler the transport layer calls.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use prometheus::Registry;
use tracing::{debug, info};

use super::byte_gate::ByteGate;
use super::concurrency_gate::ConcurrencyGate;
use crate::domain::{ByteAllocator, PeerId, ThrottleError, ThrottlerConfig, ThrottlerStats};
use crate::metrics::ThrottlerMetrics;
use crate::ports::{InboundMsgThrottler, WeightOracle};

/// Sybil-safe inbound message admission.
///
/// Two resources gate every inbound message:
///
/// 1. A per-peer processing slot ([`ConcurrencyGate`]): each message being
///    processed takes one slot, regardless of size.
/// 2. Buffer bytes ([`ByteGate`]): a message of length n takes n bytes from
///    the weighted or at-large pool.
///
/// `acquire` takes the slot first, then the bytes. `release` returns the
/// bytes first, then the slot, so a peer never gets a new slot while its
/// byte debt is still outstanding.
///
/// ## Thread Safety
///
/// Shareable across tasks via `Arc`. Each gate has its own lock; no lock is
/// held across an `.await`.
pub struct InboundAdmissionController {
    concurrency_gate: ConcurrencyGate,
    byte_gate: ByteGate,
    metrics: ThrottlerMetrics,
}

impl InboundAdmissionController {
    /// Create a throttler whose metrics live under `namespace` in `registry`.
    pub fn new(
        namespace: &str,
        registry: &Registry,
        weights: Arc<dyn WeightOracle>,
        config: ThrottlerConfig,
    ) -> Result<Self, ThrottleError> {
        config.validate()?;
        let metrics = ThrottlerMetrics::register(namespace, registry)?;

        info!(
            namespace,
            weighted_pool = config.weighted_pool_capacity,
            at_large_pool = config.at_large_pool_capacity,
            per_peer_at_large = config.per_peer_at_large_cap,
            max_concurrent = config.max_concurrent_per_peer,
            "Inbound message throttler initialized"
        );

        Ok(Self {
            concurrency_gate: ConcurrencyGate::new(
                config.max_concurrent_per_peer,
                metrics.clone(),
            ),
            byte_gate: ByteGate::new(ByteAllocator::new(&config), weights, metrics.clone()),
            metrics,
        })
    }

    /// Suspends until a message of `size` bytes may be read from `peer`.
    ///
    /// Every completed call must be matched by exactly one
    /// [`release`](Self::release) with the same arguments. Dropping the
    /// future before it completes leaves nothing to release.
    pub async fn acquire(&self, size: u64, peer: PeerId) {
        let started = Instant::now();

        self.concurrency_gate.acquire(peer).await;
        let mut slot = SlotHold {
            gate: &self.concurrency_gate,
            peer,
            armed: true,
        };
        self.byte_gate.acquire(size, peer).await;
        slot.armed = false;

        let waited = started.elapsed();
        self.metrics.acquire_latency.observe(waited.as_secs_f64());
        debug!(%peer, size, waited_ms = waited.as_millis() as u64, "Inbound message admitted");
    }

    /// Marks a message admitted by [`acquire`](Self::acquire) as done.
    ///
    /// # Panics
    /// If `(size, peer)` does not match an outstanding admission.
    pub fn release(&self, size: u64, peer: PeerId) {
        self.byte_gate.release(size, peer);
        self.concurrency_gate.release(peer);
    }

    /// [`acquire`](Self::acquire), returning a permit that releases on drop.
    pub async fn admit(&self, size: u64, peer: PeerId) -> AdmissionPermit<'_> {
        self.acquire(size, peer).await;
        AdmissionPermit {
            controller: self,
            size,
            peer,
        }
    }

    /// Snapshot of pool levels and queue depths.
    pub fn stats(&self) -> ThrottlerStats {
        let (weighted_remaining, at_large_remaining) = self.byte_gate.remaining();
        let (weighted_capacity, at_large_capacity) = self.byte_gate.capacity();
        ThrottlerStats {
            weighted_capacity,
            weighted_remaining,
            at_large_capacity,
            at_large_remaining,
            byte_waiters: self.byte_gate.queue_depth(),
            msgs_in_flight: self.concurrency_gate.total_in_flight(),
            buffer_waiters: self.concurrency_gate.waiting(),
        }
    }

    /// Byte requests from `peer` waiting in the queue.
    pub fn queued_for(&self, peer: &PeerId) -> usize {
        self.byte_gate.queued_for(peer)
    }

    /// Messages from `peer` currently admitted past the concurrency gate.
    pub fn in_flight(&self, peer: &PeerId) -> u64 {
        self.concurrency_gate.in_flight(peer)
    }

    /// Bytes `peer` holds as `(weighted, at_large)`.
    pub fn held_by(&self, peer: &PeerId) -> (u64, u64) {
        self.byte_gate.held_by(peer)
    }

    pub fn metrics(&self) -> &ThrottlerMetrics {
        &self.metrics
    }
}

#[async_trait]
impl InboundMsgThrottler for InboundAdmissionController {
    async fn acquire(&self, msg_size: u64, peer: PeerId) {
        InboundAdmissionController::acquire(self, msg_size, peer).await
    }

    fn release(&self, msg_size: u64, peer: PeerId) {
        InboundAdmissionController::release(self, msg_size, peer)
    }
}

/// An admitted inbound message. Dropping it releases the admission.
#[must_use = "dropping the permit releases the admission immediately"]
pub struct AdmissionPermit<'a> {
    controller: &'a InboundAdmissionController,
    size: u64,
    peer: PeerId,
}

impl AdmissionPermit<'_> {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }
}

impl Drop for AdmissionPermit<'_> {
    fn drop(&mut self) {
        self.controller.release(self.size, self.peer);
    }
}

/// Returns the processing slot if the byte stage of `acquire` is abandoned.
struct SlotHold<'a> {
    gate: &'a ConcurrencyGate,
    peer: PeerId,
    armed: bool,
}

impl Drop for SlotHold<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.gate.release(self.peer);
        }
    }
}
