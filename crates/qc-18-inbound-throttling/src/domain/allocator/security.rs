//! Stake entitlement math.
//!
//! SECURITY-CRITICAL: decides how much of the weighted pool each validator
//! is guaranteed. Isolate for security audits.

/// A peer's weight relative to the whole weighted set, as reported by the
/// weight oracle at the moment of the check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stake {
    /// The peer's own weight (0 = not weighted)
    pub weight: u64,
    /// Sum of all weights in the snapshot
    pub total: u64,
}

impl Stake {
    /// Stake of a peer the oracle does not know.
    pub const NONE: Stake = Stake {
        weight: 0,
        total: 0,
    };

    pub fn new(weight: u64, total: u64) -> Self {
        Self { weight, total }
    }

    /// Whether the peer counts as weighted for this check.
    pub fn is_weighted(&self) -> bool {
        self.weight > 0 && self.total > 0
    }

    /// Bytes of a pool of `pool_capacity` this stake is entitled to.
    ///
    /// `floor(pool_capacity * weight / total)`, computed in 128 bits so large
    /// stakes cannot overflow. A stale snapshot where `weight > total` is
    /// capped at the whole pool.
    ///
    /// # Security
    /// Recomputed on every reservation. Caching would let a peer keep a
    /// share it no longer holds after the validator set rotates.
    pub fn entitled_share(&self, pool_capacity: u64) -> u64 {
        if !self.is_weighted() {
            return 0;
        }
        let share = u128::from(pool_capacity) * u128::from(self.weight) / u128::from(self.total);
        share.min(u128::from(pool_capacity)) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unweighted_has_no_share() {
        assert_eq!(Stake::NONE.entitled_share(1_000), 0);
        assert_eq!(Stake::new(0, 100).entitled_share(1_000), 0);
        assert_eq!(Stake::new(10, 0).entitled_share(1_000), 0);
    }

    #[test]
    fn test_share_is_floored() {
        // 1000 * 1 / 3 = 333.33..
        assert_eq!(Stake::new(1, 3).entitled_share(1_000), 333);
        assert_eq!(Stake::new(2, 3).entitled_share(1_000), 666);
    }

    #[test]
    fn test_full_weight_gets_whole_pool() {
        assert_eq!(Stake::new(7, 7).entitled_share(1_000), 1_000);
    }

    #[test]
    fn test_large_values_do_not_overflow() {
        let stake = Stake::new(u64::MAX / 2, u64::MAX);
        assert_eq!(stake.entitled_share(u64::MAX), u64::MAX / 2);
    }

    #[test]
    fn test_stale_weight_capped_at_pool() {
        assert_eq!(Stake::new(200, 100).entitled_share(1_000), 1_000);
    }
}
