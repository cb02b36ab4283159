//! # Inbound Message Throttling Subsystem (qc-18)
//!
//! Admission control for messages read from remote peers. A connection's
//! read loop must `acquire` before deserializing a message and `release`
//! once it is done with it, so no set of peers can exhaust the node's
//! memory or processing capacity.
//!
//! ## Architecture Role
//!
//! ```text
//! [Peer connection] ──header: size──→ [InboundAdmissionController]
//!                                        │ 1. per-peer slot  (ConcurrencyGate)
//!                                        │ 2. buffer bytes   (ByteGate → ByteAllocator)
//!                                        ↓
//!                                 read + process message
//!                                        │
//!                                 release(size, peer)
//! ```
//!
//! ## Security
//!
//! - Validators get a stake-proportional floor of the weighted pool that
//!   unweighted traffic can never consume
//! - Every peer, validator or not, can hold at most `perPeerAtLargeCap`
//!   bytes of the shared pool (sybil resistance)
//! - Waiting byte requests are served strictly FIFO, so large messages are
//!   not starved by streams of small ones
//! - A per-peer cap on concurrently processed messages stops floods of tiny
//!   messages
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use prometheus::Registry;
//! use qc_18_inbound_throttling::{
//!     InboundAdmissionController, PeerId, ThrottlerConfig, ValidatorWeights,
//! };
//!
//! # tokio_test_block_on(async {
//! let validator = PeerId::new([1u8; 32]);
//! let weights = Arc::new(ValidatorWeights::from_weights([(validator, 100)]));
//! let registry = Registry::new();
//! let throttler = InboundAdmissionController::new(
//!     "node",
//!     &registry,
//!     weights,
//!     ThrottlerConfig::default(),
//! )
//! .unwrap();
//!
//! let permit = throttler.admit(1024, validator).await;
//! // ... read and process the message ...
//! drop(permit);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod adapters;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod service;

pub use adapters::ValidatorWeights;
pub use domain::{
    ByteAllocator, BytePool, PeerId, Stake, ThrottleError, ThrottlerConfig, ThrottlerStats,
};
pub use metrics::ThrottlerMetrics;
pub use ports::{InboundMsgThrottler, WeightOracle};
pub use service::{AdmissionPermit, ByteGate, ConcurrencyGate, InboundAdmissionController};
