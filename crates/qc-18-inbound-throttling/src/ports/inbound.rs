//! Driving ports (inbound API).

use async_trait::async_trait;

use crate::domain::PeerId;

/// Rate-limits reading of inbound messages.
///
/// For every completed `acquire(msg_size, peer)` the caller MUST call
/// `release(msg_size, peer)` exactly once when done with the message, or
/// when it gives up on reading it. A missed release leaks that peer's
/// capacity for the life of the process.
#[async_trait]
pub trait InboundMsgThrottler: Send + Sync {
    /// Suspends until a message of `msg_size` bytes may be read from `peer`.
    async fn acquire(&self, msg_size: u64, peer: PeerId);

    /// Marks a message previously admitted by `acquire` as done.
    fn release(&self, msg_size: u64, peer: PeerId);
}
