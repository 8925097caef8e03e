//! Error types for the payment engine
//!
//! One enum covers the synchronous API surface (validation, lookup, state
//! errors) and the failures a monitor can hit while driving a job. Transient
//! gateway errors are absorbed by the monitor and never escape as job errors
//! before the confirmation timeout fires.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for payment operations
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Malformed address or non-positive amount; rejected before a job exists
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The gateway rejected the initial submit
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// Transient gateway failure (network hiccup, 5xx)
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// No terminal state observed within the configured maximum wait
    #[error("no confirmation within {waited_secs}s")]
    ConfirmationTimeout { waited_secs: u64 },

    /// Operation not allowed in the job's current state
    #[error("invalid state transition: {from} -> {to}: {reason}")]
    InvalidState {
        from: String,
        to: String,
        reason: String,
    },

    /// Unknown job id
    #[error("job {0} not found")]
    NotFound(Uuid),

    /// Job id collision on insert
    #[error("duplicate job id: {0}")]
    DuplicateId(Uuid),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl PaymentError {
    /// Create an invalid request error
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a submission failure error
    pub fn submission_failed<S: Into<String>>(msg: S) -> Self {
        Self::SubmissionFailed(msg.into())
    }

    /// Create a transient gateway error
    pub fn gateway_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::GatewayUnavailable(msg.into())
    }

    /// Create an invalid state transition error
    pub fn invalid_state<S: Into<String>>(from: S, to: S, reason: S) -> Self {
        Self::InvalidState {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        Self::GatewayUnavailable(err.to_string())
    }
}

impl From<config::ConfigError> for PaymentError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
