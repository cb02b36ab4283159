//! Inbound throttler configuration.

use serde::{Deserialize, Serialize};

use super::errors::ThrottleError;

/// Default weighted pool size (32 MiB).
pub const DEFAULT_WEIGHTED_POOL_CAPACITY: u64 = 32 * 1024 * 1024;

/// Default at-large pool size (6 MiB).
pub const DEFAULT_AT_LARGE_POOL_CAPACITY: u64 = 6 * 1024 * 1024;

/// Default per-peer at-large ceiling (one maximum-size message, 2 MiB).
pub const DEFAULT_PER_PEER_AT_LARGE_CAP: u64 = 2 * 1024 * 1024;

/// Default number of messages one peer may have mid-processing.
pub const DEFAULT_MAX_CONCURRENT_PER_PEER: u64 = 1024;

/// Inbound throttler configuration.
///
/// Field names follow the node's JSON/TOML config (`weightedPoolCapacity`,
/// ...). Missing fields fall back to the defaults above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThrottlerConfig {
    /// Bytes reserved for weighted peers, split by relative weight
    pub weighted_pool_capacity: u64,
    /// Bytes shared by all peers
    pub at_large_pool_capacity: u64,
    /// Most at-large bytes a single peer may hold at once
    pub per_peer_at_large_cap: u64,
    /// Most messages from one peer that may be mid-processing at once
    pub max_concurrent_per_peer: u64,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            weighted_pool_capacity: DEFAULT_WEIGHTED_POOL_CAPACITY,
            at_large_pool_capacity: DEFAULT_AT_LARGE_POOL_CAPACITY,
            per_peer_at_large_cap: DEFAULT_PER_PEER_AT_LARGE_CAP,
            max_concurrent_per_peer: DEFAULT_MAX_CONCURRENT_PER_PEER,
        }
    }
}

impl ThrottlerConfig {
    /// Reject configurations under which acquire could never complete.
    pub fn validate(&self) -> Result<(), ThrottleError> {
        if self.max_concurrent_per_peer == 0 {
            return Err(ThrottleError::InvalidConfig(
                "maxConcurrentPerPeer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Testing config with small pools
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            weighted_pool_capacity: 1_000,
            at_large_pool_capacity: 500,
            per_peer_at_large_cap: 200,
            max_concurrent_per_peer: 5,
        }
    }
}
