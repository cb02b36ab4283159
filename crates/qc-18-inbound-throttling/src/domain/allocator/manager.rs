//! Two-pool byte allocator.

use std::collections::HashMap;

use tracing::error;

use super::security::Stake;
use crate::domain::{BytePool, PeerId, ThrottlerConfig};

/// Tracks the weighted and at-large byte pools and what each peer holds.
///
/// Not synchronized: the owner must serialize calls so every decision sees a
/// consistent view of the pools.
#[derive(Debug)]
pub struct ByteAllocator {
    weighted_capacity: u64,
    weighted_remaining: u64,
    at_large_capacity: u64,
    at_large_remaining: u64,
    per_peer_at_large_cap: u64,
    /// Bytes each peer holds from the weighted pool
    weighted_used: HashMap<PeerId, u64>,
    /// Bytes each peer holds from the at-large pool
    at_large_used: HashMap<PeerId, u64>,
}

impl ByteAllocator {
    /// Create an allocator with both pools full.
    pub fn new(config: &ThrottlerConfig) -> Self {
        Self {
            weighted_capacity: config.weighted_pool_capacity,
            weighted_remaining: config.weighted_pool_capacity,
            at_large_capacity: config.at_large_pool_capacity,
            at_large_remaining: config.at_large_pool_capacity,
            per_peer_at_large_cap: config.per_peer_at_large_cap,
            weighted_used: HashMap::new(),
            at_large_used: HashMap::new(),
        }
    }

    /// Try to reserve `size` bytes for `peer` without waiting.
    ///
    /// The weighted pool is tried first, up to the peer's stake-proportional
    /// share. Otherwise the at-large pool is used, up to the per-peer cap.
    /// Returns the pool debited, or `None` with no state changed.
    pub fn try_reserve(&mut self, size: u64, peer: PeerId, stake: Stake) -> Option<BytePool> {
        if stake.is_weighted() && self.weighted_remaining >= size {
            let entitled = stake.entitled_share(self.weighted_capacity);
            let used = self.weighted_used(&peer);
            // `used` can exceed `entitled` after the peer's weight dropped.
            if entitled.saturating_sub(used) >= size {
                self.weighted_remaining -= size;
                *self.weighted_used.entry(peer).or_insert(0) += size;
                return Some(BytePool::Weighted);
            }
        }

        let used = self.at_large_used(&peer);
        let within_cap = used
            .checked_add(size)
            .is_some_and(|total| total <= self.per_peer_at_large_cap);
        if within_cap && self.at_large_remaining >= size {
            self.at_large_remaining -= size;
            *self.at_large_used.entry(peer).or_insert(0) += size;
            return Some(BytePool::AtLarge);
        }

        None
    }

    /// Return `size` bytes that `peer` reserved from `pool`.
    ///
    /// # Panics
    /// If `peer` holds fewer than `size` bytes in `pool`. Clamping would let
    /// the per-peer counters drift from the pool totals.
    pub fn release(&mut self, size: u64, peer: PeerId, pool: BytePool) {
        let (used, remaining, capacity) = match pool {
            BytePool::Weighted => (
                &mut self.weighted_used,
                &mut self.weighted_remaining,
                self.weighted_capacity,
            ),
            BytePool::AtLarge => (
                &mut self.at_large_used,
                &mut self.at_large_remaining,
                self.at_large_capacity,
            ),
        };
        credit(used, remaining, capacity, size, peer, pool);
    }

    /// Bytes `peer` holds from the weighted pool.
    pub fn weighted_used(&self, peer: &PeerId) -> u64 {
        self.weighted_used.get(peer).copied().unwrap_or(0)
    }

    /// Bytes `peer` holds from the at-large pool.
    pub fn at_large_used(&self, peer: &PeerId) -> u64 {
        self.at_large_used.get(peer).copied().unwrap_or(0)
    }

    pub fn weighted_capacity(&self) -> u64 {
        self.weighted_capacity
    }

    pub fn weighted_remaining(&self) -> u64 {
        self.weighted_remaining
    }

    pub fn at_large_capacity(&self) -> u64 {
        self.at_large_capacity
    }

    pub fn at_large_remaining(&self) -> u64 {
        self.at_large_remaining
    }

    pub fn per_peer_at_large_cap(&self) -> u64 {
        self.per_peer_at_large_cap
    }

    /// Bytes currently reserved from `pool` across all peers.
    pub fn reserved(&self, pool: BytePool) -> u64 {
        match pool {
            BytePool::Weighted => self.weighted_capacity - self.weighted_remaining,
            BytePool::AtLarge => self.at_large_capacity - self.at_large_remaining,
        }
    }

    /// Number of peers currently holding bytes from either pool.
    pub fn tracked_peers(&self) -> usize {
        let mut peers: Vec<&PeerId> = self
            .weighted_used
            .keys()
            .chain(self.at_large_used.keys())
            .collect();
        peers.sort_unstable();
        peers.dedup();
        peers.len()
    }
}

fn credit(
    used: &mut HashMap<PeerId, u64>,
    remaining: &mut u64,
    capacity: u64,
    size: u64,
    peer: PeerId,
    pool: BytePool,
) {
    let held = used.get(&peer).copied().unwrap_or(0);
    if size > held {
        error!(%peer, %pool, size, held, "Release exceeds bytes held by peer");
        panic!("peer {peer} released {size} {pool} bytes but holds {held}");
    }
    let restored = remaining.checked_add(size).filter(|r| *r <= capacity);
    let Some(restored) = restored else {
        error!(%pool, size, remaining = *remaining, capacity, "Release overflows pool");
        panic!("{pool} pool overflow: {remaining} + {size} > {capacity}");
    };

    *remaining = restored;
    if held == size {
        used.remove(&peer);
    } else {
        used.insert(peer, held - size);
    }
}
