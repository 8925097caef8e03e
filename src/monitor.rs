//! Per-job confirmation monitor
//!
//! One monitor owns one job: it submits the transfer, polls the gateway
//! until a terminal state or the configured maximum wait, and applies every
//! status update through the store's entry lock (single-writer discipline).
//! Cancellation is cooperative via a watch channel checked on every
//! iteration and raced against the poll-interval sleep, so a cancel does not
//! wait out a full tick.

use crate::config::EngineConfig;
use crate::error::PaymentError;
use crate::gateway::{SettlementGateway, TransferState};
use crate::models::{ErrorCode, JobError, JobStatus, PaymentJob, SettlementMode};
use crate::notify::{deliver_with_retry, NotificationSink};
use crate::store::JobStore;
use crate::PaymentResult;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Which leg of the lifecycle this monitor drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    /// Initial submit; for escrow jobs this leg ends at `Locked`
    Initial,
    /// Escrow release transfer, `Locked -> Executing -> Confirmed | Failed`
    Release,
}

/// Handle to a spawned monitor, kept by the orchestrator
pub struct MonitorHandle {
    cancel: watch::Sender<bool>,
    pub task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal the monitor to stop and cancel its job
    pub fn request_cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Background watcher driving a single job to a terminal state
pub struct ConfirmationMonitor {
    job_id: Uuid,
    phase: MonitorPhase,
    store: Arc<JobStore>,
    gateway: Arc<dyn SettlementGateway>,
    sink: Arc<dyn NotificationSink>,
    config: EngineConfig,
    cancel: watch::Receiver<bool>,
}

impl ConfirmationMonitor {
    /// Spawn a monitor task for the given job and lifecycle leg
    pub fn spawn(
        job_id: Uuid,
        phase: MonitorPhase,
        store: Arc<JobStore>,
        gateway: Arc<dyn SettlementGateway>,
        sink: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> MonitorHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let monitor = Self {
            job_id,
            phase,
            store,
            gateway,
            sink,
            config,
            cancel: cancel_rx,
        };
        let task = tokio::spawn(monitor.run());
        MonitorHandle {
            cancel: cancel_tx,
            task,
        }
    }

    async fn run(mut self) {
        match self.drive().await {
            Ok(()) => {}
            Err(PaymentError::InvalidState { .. }) => {
                debug!(job_id = %self.job_id, "monitor exited: job already settled elsewhere");
            }
            Err(e) => error!(job_id = %self.job_id, "monitor stopped: {e}"),
        }
    }

    async fn drive(&mut self) -> PaymentResult<()> {
        if *self.cancel.borrow() {
            return self.finish_cancelled().await;
        }

        let snapshot = self.store.get(self.job_id).await?;
        let escrow_lock = self.phase == MonitorPhase::Initial
            && snapshot.mode == SettlementMode::Escrow;

        if self.phase == MonitorPhase::Release {
            self.store
                .update(self.job_id, |job| {
                    job.validate_transition(JobStatus::Executing)?;
                    job.status = JobStatus::Executing;
                    Ok(())
                })
                .await?;
        }

        let receipt = self
            .gateway
            .submit(
                &snapshot.from_address,
                &snapshot.to_address,
                snapshot.amount,
                snapshot.metadata.as_ref(),
            )
            .await;

        let reference = match receipt {
            Ok(receipt) => {
                let reference = receipt.settlement_ref.clone();
                let phase = self.phase;
                self.store
                    .update(self.job_id, move |job| {
                        match phase {
                            MonitorPhase::Initial => {
                                job.validate_transition(JobStatus::Submitted)?;
                                job.status = JobStatus::Submitted;
                                job.settlement_ref = Some(receipt.settlement_ref);
                                job.fee = receipt.fee;
                                job.submitted_at = Some(Utc::now());
                            }
                            MonitorPhase::Release => {
                                if job.status != JobStatus::Executing {
                                    return Err(PaymentError::invalid_state(
                                        job.status.to_string(),
                                        JobStatus::Executing.to_string(),
                                        "release submit raced another transition".to_string(),
                                    ));
                                }
                                job.release_ref = Some(receipt.settlement_ref);
                            }
                        }
                        Ok(())
                    })
                    .await?;
                info!(
                    job_id = %self.job_id,
                    settlement_ref = %reference,
                    phase = ?self.phase,
                    "transfer submitted"
                );
                reference
            }
            Err(e) => {
                // No polling begins when the submit itself is rejected
                let job = self
                    .fail(ErrorCode::SubmissionFailed, e.to_string())
                    .await?;
                warn!(job_id = %self.job_id, "submission failed: {e}");
                self.notify(&job).await;
                return Ok(());
            }
        };

        self.poll_loop(reference, escrow_lock).await
    }

    async fn poll_loop(&mut self, reference: String, escrow_lock: bool) -> PaymentResult<()> {
        let started = Instant::now();
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.cancel.changed() => {
                    if changed.is_err() || *self.cancel.borrow() {
                        return self.finish_cancelled().await;
                    }
                    continue;
                }
            }

            if *self.cancel.borrow() {
                return self.finish_cancelled().await;
            }

            if started.elapsed() >= self.config.max_wait {
                let waited_secs = self.config.max_wait.as_secs();
                let job = self
                    .fail(
                        ErrorCode::ConfirmationTimeout,
                        format!("no terminal state within {waited_secs}s"),
                    )
                    .await?;
                warn!(job_id = %self.job_id, waited_secs, "confirmation timed out");
                self.notify(&job).await;
                return Ok(());
            }

            let status = match self.gateway.query_status(&reference).await {
                Ok(status) => status,
                Err(e) => {
                    // Transient failure: no new information, keep polling
                    debug!(job_id = %self.job_id, "transient gateway error: {e}");
                    continue;
                }
            };

            match status.state {
                TransferState::Failed => {
                    let job = self
                        .fail(
                            ErrorCode::SettlementFailed,
                            "gateway reported transfer failed".to_string(),
                        )
                        .await?;
                    warn!(job_id = %self.job_id, "transfer failed on the settlement network");
                    self.notify(&job).await;
                    return Ok(());
                }
                TransferState::Confirmed
                    if status.confirmations >= self.config.required_confirmations =>
                {
                    if escrow_lock {
                        let job = self
                            .store
                            .update(self.job_id, |job| {
                                job.validate_transition(JobStatus::Locked)?;
                                job.status = JobStatus::Locked;
                                job.confirmations = job.confirmations.max(status.confirmations);
                                Ok(())
                            })
                            .await?;
                        // Not terminal: the release step is caller-triggered
                        info!(
                            job_id = %job.job_id,
                            confirmations = job.confirmations,
                            "funds locked, awaiting release"
                        );
                    } else {
                        let job = self
                            .store
                            .update(self.job_id, |job| {
                                job.validate_transition(JobStatus::Confirmed)?;
                                job.status = JobStatus::Confirmed;
                                job.confirmations = job.confirmations.max(status.confirmations);
                                job.confirmed_at = Some(Utc::now());
                                Ok(())
                            })
                            .await?;
                        info!(
                            job_id = %job.job_id,
                            confirmations = job.confirmations,
                            "job confirmed"
                        );
                        self.notify(&job).await;
                    }
                    return Ok(());
                }
                _ => {
                    if status.confirmations > 0 {
                        self.store
                            .update(self.job_id, |job| {
                                if job.status.is_terminal() {
                                    return Err(PaymentError::invalid_state(
                                        job.status.to_string(),
                                        job.status.to_string(),
                                        "job already terminal".to_string(),
                                    ));
                                }
                                job.confirmations = job.confirmations.max(status.confirmations);
                                Ok(())
                            })
                            .await?;
                    }
                }
            }
        }
    }

    async fn fail(&self, code: ErrorCode, detail: String) -> PaymentResult<PaymentJob> {
        self.store
            .update(self.job_id, |job| {
                job.validate_transition(JobStatus::Failed)?;
                job.status = JobStatus::Failed;
                job.error = Some(JobError::new(code, detail));
                Ok(())
            })
            .await
    }

    async fn finish_cancelled(&self) -> PaymentResult<()> {
        let result = self
            .store
            .update(self.job_id, |job| {
                job.validate_transition(JobStatus::Cancelled)?;
                job.status = JobStatus::Cancelled;
                Ok(())
            })
            .await;

        match result {
            Ok(job) => {
                info!(job_id = %job.job_id, "job cancelled");
                self.notify(&job).await;
                Ok(())
            }
            // The job hit a terminal state before the cancel landed
            Err(PaymentError::InvalidState { .. }) => {
                debug!(job_id = %self.job_id, "cancel raced a terminal transition");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn notify(&self, job: &PaymentJob) {
        deliver_with_retry(
            self.sink.as_ref(),
            job,
            self.config.notify_max_attempts,
            self.config.notify_backoff,
        )
        .await;
    }
}
