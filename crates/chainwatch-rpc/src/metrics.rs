//! Counters for retry and failover activity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic counter that can be cloned and shared across tasks.
#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Point-in-time copy of [`RpcMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RpcMetricsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub rotations: u64,
    pub exhausted: u64,
}

/// Retry activity shared between the retry executor and exporters.
#[derive(Debug, Clone, Default)]
pub struct RpcMetrics {
    /// Attempts started, including the first one of each call.
    pub attempts: Counter,
    /// Calls that ended in success.
    pub successes: Counter,
    /// Individual failed attempts.
    pub failures: Counter,
    /// Endpoint rotations caused by failed attempts.
    pub rotations: Counter,
    /// Calls that failed on every attempt.
    pub exhausted: Counter,
}

impl RpcMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RpcMetricsSnapshot {
        RpcMetricsSnapshot {
            attempts: self.attempts.get(),
            successes: self.successes.get(),
            failures: self.failures.get(),
            rotations: self.rotations.get(),
            exhausted: self.exhausted.get(),
        }
    }
}
