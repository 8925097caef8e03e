//! Asynchronous payment-job orchestration for Cardano-style settlement networks
//!
//! This crate tracks payment intents (jobs) from creation through a terminal
//! state. Each job is driven by its own background monitor that submits the
//! transfer to a pluggable settlement gateway, polls for confirmations, and
//! notifies interested parties once the job settles, fails, or is cancelled.

pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod monitor;
pub mod notify;
pub mod orchestrator;
pub mod store;

use error::PaymentError;

/// Result type alias for payment-engine operations
pub type PaymentResult<T> = Result<T, PaymentError>;
