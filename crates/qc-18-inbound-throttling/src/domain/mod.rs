//! # Domain Layer for Inbound Throttling
//!
//! Pure accounting with no I/O and no locking. The service layer owns the
//! synchronization and the wait queues.
//!
//! ## Contents
//!
//! - **types**: `PeerId`, `BytePool`, `ThrottlerStats`
//! - **config**: `ThrottlerConfig`
//! - **allocator**: two-pool byte accounting and stake entitlement
//! - **errors**: `ThrottleError`

pub mod allocator;
mod config;
mod errors;
mod types;

pub use allocator::{ByteAllocator, Stake};
pub use config::{
    ThrottlerConfig, DEFAULT_AT_LARGE_POOL_CAPACITY, DEFAULT_MAX_CONCURRENT_PER_PEER,
    DEFAULT_PER_PEER_AT_LARGE_CAP, DEFAULT_WEIGHTED_POOL_CAPACITY,
};
pub use errors::ThrottleError;
pub use types::{BytePool, PeerId, ThrottlerStats};
