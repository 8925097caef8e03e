//! Engine configuration
//!
//! Defaults overlaid with `PAYMENT_*` environment variables, e.g.
//! `PAYMENT_POLL_INTERVAL_SECONDS=2` or `PAYMENT_GATEWAY_MODE=live`.

use crate::PaymentResult;
use serde::Deserialize;
use std::time::Duration;

/// Which gateway implementation to wire in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    /// Deterministic in-process mock
    Mock,
    /// Network-backed settlement service
    Live,
}

/// Runtime configuration for the orchestrator and its monitors
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Maximum time a monitor waits for a terminal state before failing the job
    pub max_wait: Duration,
    /// Confirmations required before a job is considered confirmed
    pub required_confirmations: u32,
    pub gateway_mode: GatewayMode,
    /// Base URL of the live settlement service (required in live mode)
    pub gateway_url: Option<String>,
    /// API key sent as the `project_id` header in live mode
    pub gateway_api_key: Option<String>,
    /// Webhook target for terminal-state notifications
    pub webhook_url: Option<String>,
    /// Delivery attempts per terminal notification
    pub notify_max_attempts: u32,
    /// Initial backoff between notification attempts (doubles per retry)
    pub notify_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(300),
            required_confirmations: 1,
            gateway_mode: GatewayMode::Mock,
            gateway_url: None,
            gateway_api_key: None,
            webhook_url: None,
            notify_max_attempts: 3,
            notify_backoff: Duration::from_millis(250),
        }
    }
}

/// Environment-facing shape; durations are plain integers here
#[derive(Debug, Deserialize)]
struct RawEngineConfig {
    poll_interval_seconds: u64,
    max_wait_seconds: u64,
    required_confirmations: u32,
    gateway_mode: GatewayMode,
    gateway_url: Option<String>,
    gateway_api_key: Option<String>,
    webhook_url: Option<String>,
    notify_max_attempts: u32,
    notify_backoff_ms: u64,
}

impl EngineConfig {
    /// Load configuration from defaults plus `PAYMENT_*` environment variables
    pub fn from_env() -> PaymentResult<Self> {
        let raw: RawEngineConfig = config::Config::builder()
            .set_default("poll_interval_seconds", 5u64)?
            .set_default("max_wait_seconds", 300u64)?
            .set_default("required_confirmations", 1u64)?
            .set_default("gateway_mode", "mock")?
            .set_default("notify_max_attempts", 3u64)?
            .set_default("notify_backoff_ms", 250u64)?
            .add_source(config::Environment::with_prefix("PAYMENT"))
            .build()?
            .try_deserialize()?;

        Ok(Self {
            poll_interval: Duration::from_secs(raw.poll_interval_seconds),
            max_wait: Duration::from_secs(raw.max_wait_seconds),
            required_confirmations: raw.required_confirmations,
            gateway_mode: raw.gateway_mode,
            gateway_url: raw.gateway_url,
            gateway_api_key: raw.gateway_api_key,
            webhook_url: raw.webhook_url,
            notify_max_attempts: raw.notify_max_attempts,
            notify_backoff: Duration::from_millis(raw.notify_backoff_ms),
        })
    }

    /// Rough wait estimate surfaced on job creation
    pub fn estimated_wait_seconds(&self) -> u64 {
        let per_confirmation = self.poll_interval.as_secs().max(1);
        (per_confirmation * u64::from(self.required_confirmations.max(1)))
            .min(self.max_wait.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.max_wait, Duration::from_secs(300));
        assert_eq!(config.required_confirmations, 1);
        assert_eq!(config.gateway_mode, GatewayMode::Mock);
    }

    #[test]
    fn estimated_wait_is_capped_by_max_wait() {
        let config = EngineConfig {
            poll_interval: Duration::from_secs(60),
            max_wait: Duration::from_secs(30),
            required_confirmations: 10,
            ..Default::default()
        };
        assert_eq!(config.estimated_wait_seconds(), 30);
    }
}
