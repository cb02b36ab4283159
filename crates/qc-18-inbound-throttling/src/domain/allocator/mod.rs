//! # Byte Allocator
//!
//! Splits inbound buffer memory into two pools:
//!
//! - **Weighted pool**: only validators draw from it, each up to
//!   `floor(capacity * weight / total_weight)`. Unweighted traffic can never
//!   eat into a validator's floor.
//! - **At-large pool**: anyone may draw from it, up to a hard per-peer cap,
//!   so a swarm of sybil identities gains at most `cap` bytes each.

// Semantic submodules
mod manager;
mod security;

// Re-export public API
pub use manager::ByteAllocator;
pub use security::Stake;
