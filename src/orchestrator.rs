//! Job orchestrator - public coordination surface
//!
//! A thin synchronous facade over the store: creates jobs, spawns their
//! monitors, answers status queries straight from the store, and applies
//! cancellation cooperatively. It never blocks on monitor progress and
//! contains no branching on which gateway backend is in use.

use crate::config::EngineConfig;
use crate::error::PaymentError;
use crate::gateway::SettlementGateway;
use crate::models::{CreateJobRequest, CreateJobResponse, PaymentJob};
use crate::monitor::{ConfirmationMonitor, MonitorHandle, MonitorPhase};
use crate::notify::NotificationSink;
use crate::store::JobStore;
use crate::PaymentResult;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Public-facing coordinator for payment jobs
pub struct JobOrchestrator {
    config: EngineConfig,
    store: Arc<JobStore>,
    gateway: Arc<dyn SettlementGateway>,
    sink: Arc<dyn NotificationSink>,
    monitors: Arc<RwLock<HashMap<Uuid, MonitorHandle>>>,
}

impl JobOrchestrator {
    /// Create an orchestrator over one store, gateway, and notification sink
    pub fn new(
        config: EngineConfig,
        store: Arc<JobStore>,
        gateway: Arc<dyn SettlementGateway>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            config,
            store,
            gateway,
            sink,
            monitors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a job and spawn its confirmation monitor
    ///
    /// Validates the amount and both addresses before touching the store;
    /// no job record exists and no gateway submit happens on rejection.
    pub async fn create_job(&self, request: CreateJobRequest) -> PaymentResult<CreateJobResponse> {
        if request.amount == 0 {
            return Err(PaymentError::invalid_request(
                "amount must be greater than 0",
            ));
        }
        if !self.gateway.validate_address(&request.from_address) {
            return Err(PaymentError::invalid_request(format!(
                "invalid from_address: {}",
                request.from_address
            )));
        }
        if !self.gateway.validate_address(&request.to_address) {
            return Err(PaymentError::invalid_request(format!(
                "invalid to_address: {}",
                request.to_address
            )));
        }

        let job = PaymentJob::new(
            request.from_address,
            request.to_address,
            request.amount,
            request.mode,
            request.metadata,
        );
        let job_id = self.store.insert(job.clone()).await?;

        let handle = ConfirmationMonitor::spawn(
            job_id,
            MonitorPhase::Initial,
            Arc::clone(&self.store),
            Arc::clone(&self.gateway),
            Arc::clone(&self.sink),
            self.config.clone(),
        );
        self.monitors.write().await.insert(job_id, handle);

        info!(%job_id, amount = job.amount, mode = ?job.mode, "created payment job");

        Ok(CreateJobResponse {
            job_id,
            status: job.status,
            settlement_ref: None,
            estimated_wait_seconds: self.config.estimated_wait_seconds(),
        })
    }

    /// Snapshot of a job, straight from the store
    pub async fn get_status(&self, job_id: Uuid) -> PaymentResult<PaymentJob> {
        self.store.get(job_id).await
    }

    /// Snapshots of all jobs (debugging and monitoring)
    pub async fn list_jobs(&self) -> Vec<PaymentJob> {
        self.store.list().await
    }

    /// Request cancellation of a pending or submitted job
    ///
    /// The owning monitor performs the actual `-> cancelled` transition on
    /// its next iteration; this call only signals it.
    pub async fn cancel(&self, job_id: Uuid) -> PaymentResult<()> {
        let snapshot = self.store.get(job_id).await?;
        if !snapshot.status.can_cancel() {
            return Err(PaymentError::invalid_state(
                snapshot.status.to_string(),
                "cancelled".to_string(),
                "only pending or submitted jobs can be cancelled".to_string(),
            ));
        }

        let monitors = self.monitors.read().await;
        let handle = monitors
            .get(&job_id)
            .ok_or(PaymentError::NotFound(job_id))?;
        handle.request_cancel();

        info!(%job_id, "cancellation requested");
        Ok(())
    }

    /// Trigger the escrow release step on a locked job
    ///
    /// Spawns a fresh monitor that submits the release transfer and drives
    /// `locked -> executing -> confirmed | failed`.
    pub async fn execute(&self, job_id: Uuid) -> PaymentResult<PaymentJob> {
        let snapshot = self.store.get(job_id).await?;
        if !snapshot.status.can_execute() {
            return Err(PaymentError::invalid_state(
                snapshot.status.to_string(),
                "executing".to_string(),
                "only locked escrow jobs can be released".to_string(),
            ));
        }

        let handle = ConfirmationMonitor::spawn(
            job_id,
            MonitorPhase::Release,
            Arc::clone(&self.store),
            Arc::clone(&self.gateway),
            Arc::clone(&self.sink),
            self.config.clone(),
        );
        self.monitors.write().await.insert(job_id, handle);

        info!(%job_id, "escrow release started");
        self.store.get(job_id).await
    }
}
