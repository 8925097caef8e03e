//! Core data models for the payment engine
//!
//! This module contains the job record, the status state machine, the
//! job-level error taxonomy, and the request/response types exposed by the
//! orchestrator.

use crate::error::PaymentError;
use crate::PaymentResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job status state machine
///
/// Direct flow: `Pending -> Submitted -> Confirmed | Failed`.
/// Escrow flow adds a lock step: `Submitted -> Locked -> Executing ->
/// Confirmed | Failed`. `Cancelled` is reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job created, transfer not yet submitted to the gateway
    Pending,
    /// Transfer accepted by the gateway, awaiting confirmations
    Submitted,
    /// Funds held at the settlement address, awaiting an explicit release
    Locked,
    /// Release transfer submitted, awaiting confirmations
    Executing,
    /// Transfer reached the required confirmation count
    Confirmed,
    /// Submission rejected, gateway reported failure, or confirmation timed out
    Failed,
    /// Cancelled by the caller before reaching a terminal state
    Cancelled,
}

impl JobStatus {
    /// Check if this is a terminal state (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::Cancelled)
    }

    /// Check if the caller may cancel a job in this state
    pub fn can_cancel(&self) -> bool {
        matches!(self, Self::Pending | Self::Submitted)
    }

    /// Check if the caller may trigger the escrow release step
    pub fn can_execute(&self) -> bool {
        matches!(self, Self::Locked)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Locked => "locked",
            Self::Executing => "executing",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// How the transfer settles: one-shot, or held at the settlement address
/// until an explicit release step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMode {
    /// Single transfer straight to the recipient
    Direct,
    /// Funds locked first, released to the recipient by a second transfer
    Escrow,
}

impl Default for SettlementMode {
    fn default() -> Self {
        Self::Direct
    }
}

/// Job-level error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    SubmissionFailed,
    GatewayUnavailable,
    ConfirmationTimeout,
    SettlementFailed,
    InvalidState,
    NotFound,
}

/// Error recorded on a failed job: taxonomy code plus free-form detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: ErrorCode,
    pub detail: String,
}

impl JobError {
    pub fn new<S: Into<String>>(code: ErrorCode, detail: S) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

/// One tracked payment intent from creation to terminal state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentJob {
    pub job_id: Uuid,
    pub from_address: String,
    pub to_address: String,
    /// Amount in the smallest indivisible unit (lovelace for ADA)
    pub amount: u64,
    pub mode: SettlementMode,
    pub status: JobStatus,

    /// Transfer reference (transaction hash) from the initial submit;
    /// set at most once, never cleared
    pub settlement_ref: Option<String>,
    /// Transfer reference of the escrow release transfer
    pub release_ref: Option<String>,
    /// Monotonically non-decreasing confirmation count
    pub confirmations: u32,
    /// Gateway-reported fee, in the same unit as `amount`
    pub fee: Option<u64>,

    /// Populated only when `status` is `Failed`
    pub error: Option<JobError>,
    /// Caller-supplied metadata, passed through unmodified
    pub metadata: Option<serde_json::Value>,

    // Timestamps, each set exactly once when the transition occurs
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentJob {
    /// Create a new job in the `Pending` state
    pub fn new(
        from_address: String,
        to_address: String,
        amount: u64,
        mode: SettlementMode,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            from_address,
            to_address,
            amount,
            mode,
            status: JobStatus::Pending,
            settlement_ref: None,
            release_ref: None,
            confirmations: 0,
            fee: None,
            error: None,
            metadata,
            created_at: now,
            submitted_at: None,
            confirmed_at: None,
            updated_at: now,
        }
    }

    /// Validate a state transition against the machine above
    ///
    /// Mutators call this under the store's entry lock before advancing the
    /// status, so a stale snapshot can never push a job backwards.
    pub fn validate_transition(&self, to: JobStatus) -> PaymentResult<()> {
        let valid = match (self.status, to) {
            (JobStatus::Pending, JobStatus::Submitted) => true,
            (JobStatus::Pending, JobStatus::Failed) => true,
            (JobStatus::Submitted, JobStatus::Locked) => true,
            (JobStatus::Submitted, JobStatus::Confirmed) => true,
            (JobStatus::Submitted, JobStatus::Failed) => true,
            (JobStatus::Locked, JobStatus::Executing) => true,
            (JobStatus::Executing, JobStatus::Confirmed) => true,
            (JobStatus::Executing, JobStatus::Failed) => true,
            // Cancellation is allowed from any non-terminal state
            (from, JobStatus::Cancelled) if !from.is_terminal() => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(PaymentError::invalid_state(
                self.status.to_string(),
                to.to_string(),
                "transition not allowed".to_string(),
            ))
        }
    }
}

/// Request to create a payment job
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    pub from_address: String,
    pub to_address: String,
    /// Amount in the smallest indivisible unit; must be positive
    pub amount: u64,
    #[serde(default)]
    pub mode: SettlementMode,
    pub metadata: Option<serde_json::Value>,
}

/// Response returned by `create_job`
#[derive(Debug, Clone, Serialize)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub settlement_ref: Option<String>,
    pub estimated_wait_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_starts_pending() {
        let job = PaymentJob::new(
            "addr_test1qq".into(),
            "addr_test1vr".into(),
            1_000_000,
            SettlementMode::Direct,
            None,
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.confirmations, 0);
        assert!(job.settlement_ref.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn forward_transitions_are_allowed() {
        let mut job = PaymentJob::new(
            "addr1a".into(),
            "addr1b".into(),
            1,
            SettlementMode::Escrow,
            None,
        );
        for next in [
            JobStatus::Submitted,
            JobStatus::Locked,
            JobStatus::Executing,
            JobStatus::Confirmed,
        ] {
            job.validate_transition(next).unwrap();
            job.status = next;
        }
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let mut job = PaymentJob::new(
            "addr1a".into(),
            "addr1b".into(),
            1,
            SettlementMode::Direct,
            None,
        );
        job.status = JobStatus::Confirmed;
        assert!(job.validate_transition(JobStatus::Cancelled).is_err());
        assert!(job.validate_transition(JobStatus::Failed).is_err());

        job.status = JobStatus::Cancelled;
        assert!(job.validate_transition(JobStatus::Submitted).is_err());
    }

    #[test]
    fn no_backwards_transitions() {
        let mut job = PaymentJob::new(
            "addr1a".into(),
            "addr1b".into(),
            1,
            SettlementMode::Direct,
            None,
        );
        job.status = JobStatus::Submitted;
        assert!(job.validate_transition(JobStatus::Pending).is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Confirmed).unwrap(),
            "\"confirmed\""
        );
        assert_eq!(JobStatus::Locked.to_string(), "locked");
    }
}
