//! Settlement gateway boundary
//!
//! Everything that actually moves value lives behind the `SettlementGateway`
//! trait: a deterministic mock for development and tests, and an HTTP-backed
//! client for a live settlement service. The orchestrator and monitors only
//! see the trait; which implementation runs is decided once, from
//! configuration.

use crate::config::{EngineConfig, GatewayMode};
use crate::error::PaymentError;
use crate::PaymentResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Transfer state as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    /// Reference not known to the gateway (yet)
    Unknown,
    /// Accepted, not yet confirmed
    Pending,
    /// Confirmed on the settlement network
    Confirmed,
    /// Definitively failed
    Failed,
}

/// Result of a status query; safe to request repeatedly
#[derive(Debug, Clone, Copy)]
pub struct TransferStatus {
    pub state: TransferState,
    pub confirmations: u32,
}

/// Result of a successful submit
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    /// Opaque reference for later status queries (e.g. a transaction hash)
    pub settlement_ref: String,
    /// Gateway fee estimate, in the smallest currency unit
    pub fee: Option<u64>,
}

/// External system that moves value and reports transfer status
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// Submit a transfer; returns a settlement reference on acceptance
    async fn submit(
        &self,
        from: &str,
        to: &str,
        amount: u64,
        metadata: Option<&serde_json::Value>,
    ) -> PaymentResult<SubmitReceipt>;

    /// Query the status of a previously submitted transfer (idempotent read)
    async fn query_status(&self, settlement_ref: &str) -> PaymentResult<TransferStatus>;

    /// Validate an address; pure, no side effects
    fn validate_address(&self, address: &str) -> bool;
}

/// Build the configured gateway implementation
pub fn gateway_from_config(config: &EngineConfig) -> PaymentResult<Arc<dyn SettlementGateway>> {
    match config.gateway_mode {
        GatewayMode::Mock => Ok(Arc::new(MockGateway::default())),
        GatewayMode::Live => {
            let base_url = config
                .gateway_url
                .clone()
                .ok_or_else(|| PaymentError::config("gateway_url is required in live mode"))?;
            Ok(Arc::new(HttpGateway::new(
                base_url,
                config.gateway_api_key.clone(),
            )))
        }
    }
}

fn has_valid_prefix(address: &str) -> bool {
    address.starts_with("addr1") || address.starts_with("addr_test")
}

/// Behavior knobs for the mock gateway
#[derive(Debug, Clone)]
pub struct MockGatewayConfig {
    /// Number of status polls before the transfer reports `Confirmed`
    pub confirm_after_polls: u32,
    /// Confirmation count reported once confirmed
    pub confirmations_on_confirm: u32,
    /// Reject every submit
    pub submit_fails: bool,
    /// Report the transfer `Failed` after submission succeeds
    pub reports_failed: bool,
    /// Never reach a terminal state (exercises the confirmation timeout)
    pub never_confirms: bool,
    /// Error the first N status polls per transfer (transient failures)
    pub flaky_polls: u32,
    /// Artificial latency on every call
    pub latency: Duration,
}

impl Default for MockGatewayConfig {
    fn default() -> Self {
        Self {
            confirm_after_polls: 2,
            confirmations_on_confirm: 5,
            submit_fails: false,
            reports_failed: false,
            never_confirms: false,
            flaky_polls: 0,
            latency: Duration::from_millis(0),
        }
    }
}

/// Deterministic in-process gateway for development and tests
#[derive(Default)]
pub struct MockGateway {
    config: MockGatewayConfig,
    /// Status poll count per settlement reference
    polls: Mutex<HashMap<String, u32>>,
    submit_calls: AtomicU64,
    query_calls: AtomicU64,
}

impl MockGateway {
    pub fn new(config: MockGatewayConfig) -> Self {
        Self {
            config,
            polls: Mutex::new(HashMap::new()),
            submit_calls: AtomicU64::new(0),
            query_calls: AtomicU64::new(0),
        }
    }

    /// Total submit calls observed
    pub fn submit_calls(&self) -> u64 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// Total status queries observed
    pub fn query_calls(&self) -> u64 {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettlementGateway for MockGateway {
    async fn submit(
        &self,
        from: &str,
        to: &str,
        amount: u64,
        _metadata: Option<&serde_json::Value>,
    ) -> PaymentResult<SubmitReceipt> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        if self.config.submit_fails {
            return Err(PaymentError::submission_failed("mock gateway rejected submit"));
        }
        if !has_valid_prefix(from) || !has_valid_prefix(to) {
            return Err(PaymentError::submission_failed("malformed address"));
        }
        if amount == 0 {
            return Err(PaymentError::submission_failed("zero amount"));
        }

        let settlement_ref = format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        );
        debug!(%settlement_ref, amount, "mock gateway accepted transfer");

        Ok(SubmitReceipt {
            settlement_ref,
            fee: Some(170_000),
        })
    }

    async fn query_status(&self, settlement_ref: &str) -> PaymentResult<TransferStatus> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        let polls = {
            let mut polls = self.polls.lock().unwrap_or_else(|e| e.into_inner());
            let count = polls.entry(settlement_ref.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if polls <= self.config.flaky_polls {
            return Err(PaymentError::gateway_unavailable("mock network hiccup"));
        }

        if self.config.reports_failed {
            return Ok(TransferStatus {
                state: TransferState::Failed,
                confirmations: 0,
            });
        }

        if self.config.never_confirms || polls < self.config.confirm_after_polls {
            return Ok(TransferStatus {
                state: TransferState::Pending,
                confirmations: 0,
            });
        }

        // Confirmations keep growing after the confirmation point
        let confirmations =
            self.config.confirmations_on_confirm + (polls - self.config.confirm_after_polls);
        Ok(TransferStatus {
            state: TransferState::Confirmed,
            confirmations,
        })
    }

    fn validate_address(&self, address: &str) -> bool {
        has_valid_prefix(address)
    }
}

#[derive(Debug, Serialize)]
struct SendPaymentRequest<'a> {
    from_address: &'a str,
    to_address: &'a str,
    amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SendPaymentResponse {
    tx_hash: String,
    fee: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TxStatusResponse {
    status: String,
    #[serde(default)]
    confirmations: u32,
}

/// HTTP-backed gateway client for a live settlement service
///
/// Speaks the settlement service's JSON surface: `POST /send_payment` and
/// `GET /tx_status/{ref}`.
pub struct HttpGateway {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        info!(%base_url, "using live settlement gateway");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("project_id", key),
            None => builder,
        }
    }
}

#[async_trait]
impl SettlementGateway for HttpGateway {
    async fn submit(
        &self,
        from: &str,
        to: &str,
        amount: u64,
        metadata: Option<&serde_json::Value>,
    ) -> PaymentResult<SubmitReceipt> {
        let body = SendPaymentRequest {
            from_address: from,
            to_address: to,
            amount,
            metadata,
        };
        let response = self
            .request(self.client.post(format!("{}/send_payment", self.base_url)))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PaymentError::submission_failed(format!(
                "gateway rejected transfer ({status}): {detail}"
            )));
        }
        if !status.is_success() {
            return Err(PaymentError::gateway_unavailable(format!(
                "gateway returned {status}"
            )));
        }

        let accepted: SendPaymentResponse = response.json().await?;
        Ok(SubmitReceipt {
            settlement_ref: accepted.tx_hash,
            fee: accepted.fee,
        })
    }

    async fn query_status(&self, settlement_ref: &str) -> PaymentResult<TransferStatus> {
        let response = self
            .request(
                self.client
                    .get(format!("{}/tx_status/{}", self.base_url, settlement_ref)),
            )
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(TransferStatus {
                state: TransferState::Unknown,
                confirmations: 0,
            });
        }
        if !response.status().is_success() {
            return Err(PaymentError::gateway_unavailable(format!(
                "gateway returned {}",
                response.status()
            )));
        }

        let body: TxStatusResponse = response.json().await?;
        let state = match body.status.as_str() {
            "pending" | "locked_to_contract" => TransferState::Pending,
            "confirmed" => TransferState::Confirmed,
            "failed" => TransferState::Failed,
            _ => TransferState::Unknown,
        };
        Ok(TransferStatus {
            state,
            confirmations: body.confirmations,
        })
    }

    fn validate_address(&self, address: &str) -> bool {
        has_valid_prefix(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_confirms_after_configured_polls() {
        let gateway = MockGateway::new(MockGatewayConfig {
            confirm_after_polls: 3,
            confirmations_on_confirm: 2,
            ..Default::default()
        });
        let receipt = gateway
            .submit("addr_test1qq", "addr_test1vr", 1_000_000, None)
            .await
            .unwrap();

        for _ in 0..2 {
            let status = gateway.query_status(&receipt.settlement_ref).await.unwrap();
            assert_eq!(status.state, TransferState::Pending);
        }
        let status = gateway.query_status(&receipt.settlement_ref).await.unwrap();
        assert_eq!(status.state, TransferState::Confirmed);
        assert_eq!(status.confirmations, 2);

        // Confirmations keep growing on later polls
        let status = gateway.query_status(&receipt.settlement_ref).await.unwrap();
        assert_eq!(status.confirmations, 3);
    }

    #[tokio::test]
    async fn mock_flaky_polls_error_then_recover() {
        let gateway = MockGateway::new(MockGatewayConfig {
            confirm_after_polls: 1,
            flaky_polls: 2,
            ..Default::default()
        });
        let receipt = gateway
            .submit("addr1a", "addr1b", 500, None)
            .await
            .unwrap();

        assert!(gateway.query_status(&receipt.settlement_ref).await.is_err());
        assert!(gateway.query_status(&receipt.settlement_ref).await.is_err());
        let status = gateway.query_status(&receipt.settlement_ref).await.unwrap();
        assert_eq!(status.state, TransferState::Confirmed);
    }

    #[test]
    fn address_validation_matches_network_prefixes() {
        let gateway = MockGateway::default();
        assert!(gateway.validate_address("addr1qxyz"));
        assert!(gateway.validate_address("addr_test1vr"));
        assert!(!gateway.validate_address("0x1234"));
        assert!(!gateway.validate_address(""));
    }

    #[tokio::test]
    async fn mock_counts_calls() {
        let gateway = MockGateway::default();
        gateway
            .submit("addr1a", "addr1b", 1, None)
            .await
            .unwrap();
        assert_eq!(gateway.submit_calls(), 1);
        assert_eq!(gateway.query_calls(), 0);
    }
}
