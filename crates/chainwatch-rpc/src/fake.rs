//! In-memory [`LedgerRpc`] for tests. Built with `cfg(test)` or the
//! `test-util` feature.
//!
//! Each endpoint URL can be marked down or made to fail a single method.
//! Responses come from one shared set of chain values, so a snapshot served by
//! any healthy endpoint is identical.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{Commitment, LedgerRpc, PerformanceSample};
use crate::endpoint::Endpoint;
use crate::error::{Result, RpcError};

pub const METHOD_BLOCK_HEIGHT: &str = "getBlockHeight";
pub const METHOD_SLOT: &str = "getSlot";
pub const METHOD_SUPPLY: &str = "getSupply";
pub const METHOD_PERFORMANCE: &str = "getRecentPerformanceSamples";

/// Values every healthy endpoint reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainValues {
    pub block_height: u64,
    pub slot: u64,
    pub total_supply: u64,
    /// `None` reports a sample without a transaction count.
    pub transactions: Option<u64>,
    /// Report an empty sample list.
    pub no_samples: bool,
}

impl Default for ChainValues {
    fn default() -> Self {
        Self {
            block_height: 250_000_000,
            slot: 270_000_000,
            total_supply: 580_000_000_000_000_000,
            transactions: Some(4_000),
            no_samples: false,
        }
    }
}

#[derive(Default)]
struct FakeState {
    values: ChainValues,
    down: HashSet<String>,
    failing_methods: HashSet<(String, &'static str)>,
    started: HashMap<(String, &'static str), u64>,
    completed: HashMap<(String, &'static str), u64>,
    latency: HashMap<&'static str, Duration>,
    commitments: HashMap<&'static str, Commitment>,
}

/// Scriptable fake ledger service.
#[derive(Default)]
pub struct FakeLedgerRpc {
    state: Mutex<FakeState>,
}

impl FakeLedgerRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: ChainValues) -> Self {
        let fake = Self::default();
        fake.set_values(values);
        fake
    }

    pub fn set_values(&self, values: ChainValues) {
        self.lock().values = values;
    }

    pub fn set_transactions(&self, transactions: Option<u64>) {
        self.lock().values.transactions = transactions;
    }

    /// Mark an endpoint as failing every call (or restore it).
    pub fn set_down(&self, url: &str, down: bool) {
        let mut state = self.lock();
        if down {
            state.down.insert(url.to_string());
        } else {
            state.down.remove(url);
        }
    }

    /// Make one method fail on one endpoint.
    pub fn fail_method(&self, url: &str, method: &'static str) {
        self.lock().failing_methods.insert((url.to_string(), method));
    }

    /// Delay every call of `method` by `latency`.
    pub fn set_latency(&self, method: &'static str, latency: Duration) {
        self.lock().latency.insert(method, latency);
    }

    /// Calls of `method` started against `url`.
    pub fn started(&self, url: &str, method: &'static str) -> u64 {
        self.lock()
            .started
            .get(&(url.to_string(), method))
            .copied()
            .unwrap_or(0)
    }

    /// Calls of `method` against `url` that ran to completion.
    pub fn completed(&self, url: &str, method: &'static str) -> u64 {
        self.lock()
            .completed
            .get(&(url.to_string(), method))
            .copied()
            .unwrap_or(0)
    }

    /// Commitment sent with the most recent call of `method`.
    pub fn last_commitment(&self, method: &'static str) -> Option<Commitment> {
        self.lock().commitments.get(method).copied()
    }

    /// Calls of any method started against `url`.
    pub fn started_total(&self, url: &str) -> u64 {
        self.lock()
            .started
            .iter()
            .filter(|((u, _), _)| u == url)
            .map(|(_, n)| *n)
            .sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn respond<T>(
        &self,
        endpoint: &Endpoint,
        method: &'static str,
        commitment: Option<Commitment>,
        value: impl FnOnce(&ChainValues) -> T,
    ) -> Result<T> {
        let key = (endpoint.url().to_string(), method);
        let (latency, fails) = {
            let mut state = self.lock();
            *state.started.entry(key.clone()).or_insert(0) += 1;
            if let Some(commitment) = commitment {
                state.commitments.insert(method, commitment);
            }
            let fails =
                state.down.contains(endpoint.url()) || state.failing_methods.contains(&key);
            (state.latency.get(method).copied(), fails)
        };

        if fails {
            return Err(RpcError::Transport {
                endpoint: endpoint.url().to_string(),
                method: method.to_string(),
                reason: "endpoint unavailable".to_string(),
            });
        }

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        *state.completed.entry(key).or_insert(0) += 1;
        Ok(value(&state.values))
    }
}

#[async_trait]
impl LedgerRpc for FakeLedgerRpc {
    async fn block_height(&self, endpoint: &Endpoint, commitment: Commitment) -> Result<u64> {
        self.respond(endpoint, METHOD_BLOCK_HEIGHT, Some(commitment), |v| {
            v.block_height
        })
            .await
    }

    async fn slot(&self, endpoint: &Endpoint, commitment: Commitment) -> Result<u64> {
        self.respond(endpoint, METHOD_SLOT, Some(commitment), |v| v.slot)
            .await
    }

    async fn total_supply(&self, endpoint: &Endpoint, commitment: Commitment) -> Result<u64> {
        self.respond(endpoint, METHOD_SUPPLY, Some(commitment), |v| {
            v.total_supply
        })
            .await
    }

    async fn recent_performance_samples(
        &self,
        endpoint: &Endpoint,
        limit: usize,
    ) -> Result<Vec<PerformanceSample>> {
        self.respond(endpoint, METHOD_PERFORMANCE, None, |v| {
            if v.no_samples || limit == 0 {
                return Vec::new();
            }
            vec![PerformanceSample {
                slot: v.slot,
                num_transactions: v.transactions,
                num_slots: 1,
                sample_period_secs: 60,
            }]
        })
        .await
    }
}
