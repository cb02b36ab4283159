//! Core identifiers and snapshots for inbound throttling.

use std::fmt;

/// 32-byte identifier of a remote peer.
///
/// # Example
///
/// ```rust
/// use qc_18_inbound_throttling::PeerId;
///
/// let peer = PeerId::new([0xAB; 32]);
/// let peer_from_bytes = PeerId::from_bytes(&[0xAB; 32]).unwrap();
/// assert_eq!(peer, peer_from_bytes);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// Creates a new peer ID from a 32-byte array.
    pub fn new(id: [u8; 32]) -> Self {
        Self(id)
    }

    /// Creates a peer ID from a byte slice.
    ///
    /// Returns `None` if the slice is shorter than 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() >= 32 {
            let mut id = [0u8; 32];
            id.copy_from_slice(&bytes[..32]);
            Some(Self(id))
        } else {
            None
        }
    }

    /// Raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    /// Short hex form (first 4 bytes), enough to tell peers apart in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        f.write_str("..")
    }
}

/// The byte pool a grant was drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BytePool {
    /// Reserved for weighted peers, split by stake.
    Weighted,
    /// Shared by every peer, capped per peer.
    AtLarge,
}

impl BytePool {
    /// Label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            BytePool::Weighted => "weighted",
            BytePool::AtLarge => "at_large",
        }
    }
}

impl fmt::Display for BytePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the throttler's resources.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ThrottlerStats {
    /// Total size of the weighted pool.
    pub weighted_capacity: u64,
    /// Bytes currently free in the weighted pool.
    pub weighted_remaining: u64,
    /// Total size of the at-large pool.
    pub at_large_capacity: u64,
    /// Bytes currently free in the at-large pool.
    pub at_large_remaining: u64,
    /// Byte requests queued behind the head of the line.
    pub byte_waiters: usize,
    /// Messages admitted past the concurrency gate and not yet released.
    pub msgs_in_flight: u64,
    /// Requests waiting for a per-peer concurrency slot.
    pub buffer_waiters: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_from_short_slice() {
        assert!(PeerId::from_bytes(&[1u8; 31]).is_none());
    }

    #[test]
    fn test_peer_id_display_is_short_hex() {
        let mut id = [0u8; 32];
        id[0] = 0xde;
        id[1] = 0xad;
        id[2] = 0xbe;
        id[3] = 0xef;
        assert_eq!(PeerId::new(id).to_string(), "deadbeef..");
    }

    #[test]
    fn test_pool_labels() {
        assert_eq!(BytePool::Weighted.to_string(), "weighted");
        assert_eq!(BytePool::AtLarge.as_str(), "at_large");
    }
}
