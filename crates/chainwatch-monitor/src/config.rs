use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use chainwatch_rpc::{Commitment, EndpointPool, RetryConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};
use crate::status::StatusAggregator;

/// Public endpoints used when none are configured.
pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "https://api.devnet.solana.com",
    "https://api.testnet.solana.com",
    "https://solana-api.projectserum.com",
];

/// Largest accepted `history_capacity`.
pub const MAX_HISTORY_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffPolicy {
    #[default]
    None,
    Fixed,
    Exponential,
}

/// Delay between failover attempts. Disabled by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub policy: BackoffPolicy,
    /// Fixed delay, or the initial delay for exponential backoff.
    pub delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            policy: BackoffPolicy::None,
            delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub endpoints: Vec<String>,
    pub poll_interval_secs: u64,
    pub max_retries: u32,
    pub history_capacity: usize,
    pub commitment: Commitment,
    pub request_timeout_secs: u64,
    /// Window the performance sample count is divided by to get TPS.
    pub sampling_window_secs: f64,
    /// Base units per whole token.
    pub lamports_per_token: f64,
    /// Multiplier turning whole tokens into the storage estimate.
    pub storage_scale: f64,
    pub backoff: BackoffConfig,
    /// Address for the HTTP status API; disabled when unset.
    pub bind_addr: Option<SocketAddr>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            poll_interval_secs: 10,
            max_retries: 3,
            history_capacity: 10,
            commitment: Commitment::Finalized,
            request_timeout_secs: 10,
            sampling_window_secs: 10.0,
            lamports_per_token: 1_000_000_000.0,
            storage_scale: 0.001,
            backoff: BackoffConfig::default(),
            bind_addr: None,
        }
    }
}

impl MonitorConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| MonitorError::ConfigRead {
                path: path.display().to_string(),
                source,
            })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)
                .map_err(|e| MonitorError::Config(format!("{}: {}", path.display(), e))),
            "json" => serde_json::from_str(&contents)
                .map_err(|e| MonitorError::Config(format!("{}: {}", path.display(), e))),
            _ => Err(MonitorError::Config(format!(
                "unsupported config file extension: {:?}",
                ext
            ))),
        }
    }

    /// Reject settings the poller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(MonitorError::Config("endpoint list is empty".into()));
        }
        if let Some(blank) = self.endpoints.iter().position(|e| e.trim().is_empty()) {
            return Err(MonitorError::Config(format!("endpoint #{} is blank", blank + 1)));
        }
        if self.poll_interval_secs == 0 {
            return Err(MonitorError::Config("poll_interval_secs must be > 0".into()));
        }
        if self.max_retries == 0 {
            return Err(MonitorError::Config("max_retries must be > 0".into()));
        }
        if self.history_capacity == 0 {
            return Err(MonitorError::Config("history_capacity must be > 0".into()));
        }
        if self.history_capacity > MAX_HISTORY_CAPACITY {
            return Err(MonitorError::Config(format!(
                "history_capacity must be <= {}",
                MAX_HISTORY_CAPACITY
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(MonitorError::Config("request_timeout_secs must be > 0".into()));
        }
        if self.sampling_window_secs.is_nan() || self.sampling_window_secs <= 0.0 {
            return Err(MonitorError::Config("sampling_window_secs must be > 0".into()));
        }
        if self.lamports_per_token.is_nan() || self.lamports_per_token <= 0.0 {
            return Err(MonitorError::Config("lamports_per_token must be > 0".into()));
        }
        if self.backoff.policy == BackoffPolicy::Exponential && self.backoff.multiplier < 1.0 {
            return Err(MonitorError::Config("backoff multiplier must be >= 1.0".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn endpoint_pool(&self) -> Result<EndpointPool> {
        Ok(EndpointPool::from_urls(&self.endpoints)?)
    }

    pub fn retry_config(&self) -> RetryConfig {
        let policy = match self.backoff.policy {
            BackoffPolicy::None => RetryPolicy::None,
            BackoffPolicy::Fixed => {
                RetryPolicy::Fixed(Duration::from_millis(self.backoff.delay_ms))
            }
            BackoffPolicy::Exponential => RetryPolicy::ExponentialBackoff,
        };

        RetryConfig {
            max_retries: self.max_retries,
            policy,
            initial_backoff: Duration::from_millis(self.backoff.delay_ms),
            max_backoff: Duration::from_millis(self.backoff.max_delay_ms),
            backoff_multiplier: self.backoff.multiplier,
            jitter: self.backoff.jitter,
        }
    }

    pub fn aggregator(&self) -> StatusAggregator {
        StatusAggregator::new(
            self.lamports_per_token,
            self.storage_scale,
            self.sampling_window_secs,
        )
    }
}
