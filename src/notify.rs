//! Terminal-state notification boundary
//!
//! A monitor calls the sink at least once for every terminal transition.
//! Delivery is best-effort: bounded retries with doubling backoff, then
//! drop-and-log. A delivery failure never reverts a job's state.

use crate::config::EngineConfig;
use crate::models::PaymentJob;
use crate::PaymentResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Receiver of terminal-state events (display device, webhook, dependent agent)
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver a terminal job snapshot; must tolerate repeated delivery
    async fn notify(&self, job: &PaymentJob) -> PaymentResult<()>;
}

/// Build the configured sink: webhook when a URL is set, log-only otherwise
pub fn sink_from_config(config: &EngineConfig) -> Arc<dyn NotificationSink> {
    match &config.webhook_url {
        Some(url) => Arc::new(WebhookSink::new(url.clone())),
        None => Arc::new(LogSink),
    }
}

/// Deliver with bounded retries; drops and logs after the final attempt
pub async fn deliver_with_retry(
    sink: &dyn NotificationSink,
    job: &PaymentJob,
    max_attempts: u32,
    initial_backoff: Duration,
) {
    let max_attempts = max_attempts.max(1);
    let mut backoff = initial_backoff;
    for attempt in 1..=max_attempts {
        match sink.notify(job).await {
            Ok(()) => {
                debug!(job_id = %job.job_id, status = %job.status, "notification delivered");
                return;
            }
            Err(e) if attempt < max_attempts => {
                warn!(
                    job_id = %job.job_id,
                    attempt,
                    "notification failed, retrying: {e}"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => {
                error!(
                    job_id = %job.job_id,
                    "dropping notification after {max_attempts} attempts: {e}"
                );
            }
        }
    }
}

/// Sink that only logs; used when no webhook is configured
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, job: &PaymentJob) -> PaymentResult<()> {
        info!(
            job_id = %job.job_id,
            status = %job.status,
            settlement_ref = job.settlement_ref.as_deref().unwrap_or("-"),
            confirmations = job.confirmations,
            "job reached terminal state"
        );
        Ok(())
    }
}

/// Sink that POSTs the terminal job snapshot as JSON to a webhook
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, job: &PaymentJob) -> PaymentResult<()> {
        let response = self.client.post(&self.url).json(job).send().await?;
        if !response.status().is_success() {
            return Err(crate::error::PaymentError::gateway_unavailable(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PaymentError;
    use crate::models::SettlementMode;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakySink {
        failures_left: AtomicU32,
        delivered: AtomicU32,
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        async fn notify(&self, _job: &PaymentJob) -> PaymentResult<()> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(PaymentError::gateway_unavailable("sink down"));
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn job() -> PaymentJob {
        PaymentJob::new(
            "addr1a".into(),
            "addr1b".into(),
            1,
            SettlementMode::Direct,
            None,
        )
    }

    #[tokio::test]
    async fn retries_until_delivery() {
        let sink = FlakySink {
            failures_left: AtomicU32::new(2),
            delivered: AtomicU32::new(0),
        };
        deliver_with_retry(&sink, &job(), 3, Duration::from_millis(1)).await;
        assert_eq!(sink.delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drops_after_exhausting_attempts() {
        let sink = FlakySink {
            failures_left: AtomicU32::new(10),
            delivered: AtomicU32::new(0),
        };
        deliver_with_retry(&sink, &job(), 2, Duration::from_millis(1)).await;
        assert_eq!(sink.delivered.load(Ordering::SeqCst), 0);
    }
}
