//! Concurrency-safe job registry
//!
//! The store is the only shared mutable resource in the engine. The outer map
//! is guarded by an `RwLock`; every entry carries its own `Mutex` so mutation
//! of one job is serialized without blocking reads or updates of other jobs.
//! Reads return clones, never live references, so callers cannot race with
//! the monitor that owns the job.

use crate::error::PaymentError;
use crate::models::PaymentJob;
use crate::PaymentResult;
use chrono::Utc;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Registry of payment jobs keyed by job id
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, Arc<Mutex<PaymentJob>>>>,
}

impl JobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new job, failing on id collision
    pub async fn insert(&self, job: PaymentJob) -> PaymentResult<Uuid> {
        let job_id = job.job_id;
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job_id) {
            return Err(PaymentError::DuplicateId(job_id));
        }
        jobs.insert(job_id, Arc::new(Mutex::new(job)));
        Ok(job_id)
    }

    /// Get a snapshot of a job
    pub async fn get(&self, job_id: Uuid) -> PaymentResult<PaymentJob> {
        let entry = self.entry(job_id).await?;
        let job = entry.lock().await;
        Ok(job.clone())
    }

    /// Apply a transition function atomically under the entry's lock
    ///
    /// The mutator must validate the job's current state before advancing it;
    /// it sees the live record, not the caller's possibly stale snapshot.
    /// Returns the updated snapshot.
    pub async fn update<F>(&self, job_id: Uuid, mutate: F) -> PaymentResult<PaymentJob>
    where
        F: FnOnce(&mut PaymentJob) -> PaymentResult<()>,
    {
        let entry = self.entry(job_id).await?;
        let mut job = entry.lock().await;
        mutate(&mut job)?;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    /// Snapshots of every job in the store
    pub async fn list(&self) -> Vec<PaymentJob> {
        let entries: Vec<Arc<Mutex<PaymentJob>>> =
            self.jobs.read().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(entries.len());
        for entry in entries {
            snapshots.push(entry.lock().await.clone());
        }
        snapshots
    }

    /// Number of jobs tracked
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// True when no jobs are tracked
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    async fn entry(&self, job_id: Uuid) -> PaymentResult<Arc<Mutex<PaymentJob>>> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or(PaymentError::NotFound(job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, SettlementMode};

    fn job() -> PaymentJob {
        PaymentJob::new(
            "addr_test1qq".into(),
            "addr_test1vr".into(),
            1_000_000,
            SettlementMode::Direct,
            None,
        )
    }

    #[tokio::test]
    async fn insert_and_get_returns_snapshot() {
        let store = JobStore::new();
        let id = store.insert(job()).await.unwrap();

        let mut snapshot = store.get(id).await.unwrap();
        snapshot.status = JobStatus::Confirmed;

        // Mutating the snapshot must not touch the stored record
        assert_eq!(store.get(id).await.unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let store = JobStore::new();
        let j = job();
        store.insert(j.clone()).await.unwrap();
        let err = store.insert(j).await.unwrap_err();
        assert!(matches!(err, PaymentError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = JobStore::new();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PaymentError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_applies_mutator_under_lock() {
        let store = JobStore::new();
        let id = store.insert(job()).await.unwrap();

        let updated = store
            .update(id, |j| {
                j.validate_transition(JobStatus::Submitted)?;
                j.status = JobStatus::Submitted;
                j.settlement_ref = Some("tx_abc".into());
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(updated.status, JobStatus::Submitted);
        assert_eq!(store.get(id).await.unwrap().settlement_ref.as_deref(), Some("tx_abc"));
    }

    #[tokio::test]
    async fn failed_mutator_leaves_job_unchanged() {
        let store = JobStore::new();
        let id = store.insert(job()).await.unwrap();

        let err = store
            .update(id, |j| {
                j.validate_transition(JobStatus::Confirmed)?;
                j.status = JobStatus::Confirmed;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::InvalidState { .. }));
        assert_eq!(store.get(id).await.unwrap().status, JobStatus::Pending);
    }
}
