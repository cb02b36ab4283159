//! Adapters for external integrations.

mod validator_weights;

pub use validator_weights::ValidatorWeights;
