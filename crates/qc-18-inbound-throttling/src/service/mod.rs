//! # Inbound Throttling Service
//!
//! Wires the pure allocator to locks, wait queues and metrics.
//!
//! ```text
//! read loop ──acquire(size, peer)──→ [ConcurrencyGate] ──→ [ByteGate] ──→ read + process
//!     │                                                                        │
//!     └───────────────────release(size, peer)←── bytes first, then slot ←──────┘
//! ```

mod byte_gate;
mod concurrency_gate;
mod controller;

pub use byte_gate::ByteGate;
pub use concurrency_gate::ConcurrencyGate;
pub use controller::{AdmissionPermit, InboundAdmissionController};
