//! In-memory validator weight table.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::{PeerId, Stake};
use crate::ports::WeightOracle;

#[derive(Debug, Default)]
struct WeightTable {
    weights: HashMap<PeerId, u64>,
    total: u64,
}

impl WeightTable {
    fn recompute_total(&mut self) {
        self.total = self
            .weights
            .values()
            .fold(0u64, |acc, w| acc.saturating_add(*w));
    }
}

/// Validator weights kept in memory, updated by whoever tracks the
/// validator set (e.g. on epoch rotation).
///
/// Peers with weight 0 are not stored.
#[derive(Debug, Default)]
pub struct ValidatorWeights {
    table: RwLock<WeightTable>,
}

impl ValidatorWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(peer, weight)` pairs.
    pub fn from_weights(weights: impl IntoIterator<Item = (PeerId, u64)>) -> Self {
        let this = Self::new();
        this.replace_all(weights);
        this
    }

    /// Set one peer's weight. A weight of 0 removes the peer.
    pub fn set_weight(&self, peer: PeerId, weight: u64) {
        let mut table = self.table.write();
        if weight == 0 {
            table.weights.remove(&peer);
        } else {
            table.weights.insert(peer, weight);
        }
        table.recompute_total();
    }

    /// Drop a peer from the validator set.
    pub fn remove(&self, peer: &PeerId) -> Option<u64> {
        let mut table = self.table.write();
        let removed = table.weights.remove(peer);
        table.recompute_total();
        removed
    }

    /// Replace the whole validator set at once.
    pub fn replace_all(&self, weights: impl IntoIterator<Item = (PeerId, u64)>) {
        let mut table = self.table.write();
        table.weights = weights.into_iter().filter(|(_, w)| *w > 0).collect();
        table.recompute_total();
    }

    /// Number of validators.
    pub fn len(&self) -> usize {
        self.table.read().weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().weights.is_empty()
    }
}

impl WeightOracle for ValidatorWeights {
    fn weight(&self, peer: &PeerId) -> u64 {
        self.table.read().weights.get(peer).copied().unwrap_or(0)
    }

    fn total_weight(&self) -> u64 {
        self.table.read().total
    }

    fn stake(&self, peer: &PeerId) -> Stake {
        let table = self.table.read();
        Stake::new(table.weights.get(peer).copied().unwrap_or(0), table.total)
    }
}
