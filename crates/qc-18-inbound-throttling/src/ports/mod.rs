//! # Ports Layer
//!
//! - **inbound**: what the transport's read loop calls
//! - **outbound**: what the throttler needs from the rest of the node

pub mod inbound;
pub mod outbound;

pub use inbound::InboundMsgThrottler;
pub use outbound::WeightOracle;
