//! Bounded retry with endpoint failover.
//!
//! Every failed attempt except the last rotates the pool once and retries
//! against the next endpoint. The pool is borrowed mutably for the whole call,
//! so the cursor has a single writer.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::endpoint::{Endpoint, EndpointPool};
use crate::error::Result;
use crate::metrics::RpcMetrics;

/// Delay applied between a failed attempt and the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Retry immediately on the next endpoint.
    #[default]
    None,
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff using the RetryConfig settings.
    ExponentialBackoff,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts per call (default: 3).
    pub max_retries: u32,
    /// Delay policy between attempts (default: none).
    pub policy: RetryPolicy,
    /// Initial backoff duration (default: 100ms).
    pub initial_backoff: Duration,
    /// Maximum backoff duration (default: 10 seconds).
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff (default: 2.0).
    pub backoff_multiplier: f64,
    /// Whether to add random jitter to exponential backoff (default: true).
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            policy: RetryPolicy::None,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Executes operations against the pool's current endpoint, failing over on error.
#[derive(Debug, Clone)]
pub struct RetryingRpcClient {
    config: RetryConfig,
    metrics: RpcMetrics,
}

impl RetryingRpcClient {
    pub fn new(config: RetryConfig) -> Self {
        Self::with_metrics(config, RpcMetrics::new())
    }

    /// Create a client that records into an existing metrics handle.
    pub fn with_metrics(config: RetryConfig, metrics: RpcMetrics) -> Self {
        Self { config, metrics }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn metrics(&self) -> &RpcMetrics {
        &self.metrics
    }

    /// Run `operation` against `pool.current()`, up to `max_retries` times.
    ///
    /// After each failed attempt other than the last, the pool is rotated exactly
    /// once. The error of the final attempt is returned unchanged. A `max_retries`
    /// of zero is treated as a single attempt.
    pub async fn execute<F, Fut, T>(&self, pool: &mut EndpointPool, mut operation: F) -> Result<T>
    where
        F: FnMut(Endpoint) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.metrics.attempts.inc();
            let endpoint = pool.current().clone();
            debug!(endpoint = %endpoint, attempt, max_attempts, "rpc attempt");

            match operation(endpoint.clone()).await {
                Ok(value) => {
                    self.metrics.successes.inc();
                    return Ok(value);
                }
                Err(e) => {
                    self.metrics.failures.inc();

                    if attempt >= max_attempts {
                        self.metrics.exhausted.inc();
                        warn!(
                            endpoint = %endpoint,
                            attempts = attempt,
                            error = %e,
                            "rpc retries exhausted"
                        );
                        return Err(e);
                    }

                    let next = pool.rotate();
                    self.metrics.rotations.inc();
                    warn!(
                        failed = %endpoint,
                        next = %next,
                        attempt,
                        max_attempts,
                        error = %e,
                        "rpc attempt failed, rotating endpoint"
                    );

                    if let Some(delay) = self.backoff(attempt - 1) {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Delay before the retry following failed attempt number `attempt` (0-based).
    fn backoff(&self, attempt: u32) -> Option<Duration> {
        match self.config.policy {
            RetryPolicy::None => None,
            RetryPolicy::Fixed(delay) => Some(delay),
            RetryPolicy::ExponentialBackoff => Some(self.compute_backoff(attempt)),
        }
    }

    /// Computes `initial_backoff * backoff_multiplier^attempt`, capped at
    /// `max_backoff`, plus up to 50% jitter when enabled.
    fn compute_backoff(&self, attempt: u32) -> Duration {
        let base_delay_ms = self.config.initial_backoff.as_millis() as f64;
        let max_delay_ms = self.config.max_backoff.as_millis() as f64;

        let computed = base_delay_ms * self.config.backoff_multiplier.powi(attempt as i32);
        let capped = computed.min(max_delay_ms) as u64;

        if self.config.jitter && capped >= 2 {
            let jitter_ms = rand::thread_rng().gen_range(0..=capped / 2);
            Duration::from_millis(capped.saturating_add(jitter_ms))
        } else {
            Duration::from_millis(capped)
        }
    }
}

impl Default for RetryingRpcClient {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
