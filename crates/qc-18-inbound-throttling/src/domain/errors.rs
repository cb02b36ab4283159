//! Error types for inbound throttling.
//!
//! Only construction can fail. Acquire and release have no error channel:
//! accounting violations are fatal and panic instead.

use thiserror::Error;

/// Inbound throttler construction errors.
#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("Invalid throttler configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to register throttler metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}
