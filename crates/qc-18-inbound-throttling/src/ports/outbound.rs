//! Driven ports (outbound dependencies).

use crate::domain::{PeerId, Stake};

/// Validator membership and stake, as seen by the throttler.
///
/// Queried on every reservation attempt, never cached. Implementations may
/// serve a periodically refreshed snapshot; the throttler tolerates the
/// weight of a peer changing between two calls.
pub trait WeightOracle: Send + Sync {
    /// Weight of `peer`, or 0 if it is not a validator.
    fn weight(&self, peer: &PeerId) -> u64;

    /// Sum of all validator weights.
    fn total_weight(&self) -> u64;

    /// The peer's weight paired with the total it is relative to.
    ///
    /// Override when both values can be read from one snapshot.
    fn stake(&self, peer: &PeerId) -> Stake {
        Stake::new(self.weight(peer), self.total_weight())
    }
}
