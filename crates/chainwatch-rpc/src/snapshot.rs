//! Atomic multi-query status snapshots.
//!
//! A snapshot is four independent queries issued concurrently against one
//! endpoint. Either all four succeed or the attempt fails as a unit and the
//! retry client moves to the next endpoint. Results from different endpoints
//! or different attempts are never combined.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{Commitment, LedgerRpc, PerformanceSample};
use crate::endpoint::{Endpoint, EndpointPool};
use crate::error::Result;
use crate::retry::RetryingRpcClient;

/// Raw result of one successful composed query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSnapshot {
    /// Endpoint that served every field of this snapshot.
    pub endpoint: String,
    pub block_height: u64,
    pub slot: u64,
    /// Total supply in base units.
    pub total_supply: u64,
    /// Most recent performance sample. `None` if the node returned no samples.
    pub performance: Option<PerformanceSample>,
}

impl RawSnapshot {
    /// Transactions observed in the sampled window, 0 when not reported.
    pub fn transaction_count(&self) -> u64 {
        self.performance
            .as_ref()
            .and_then(|s| s.num_transactions)
            .unwrap_or(0)
    }
}

/// Issues the snapshot fan-out through the retry client.
pub struct SnapshotComposer {
    rpc: Arc<dyn LedgerRpc>,
    retry: RetryingRpcClient,
    pool: EndpointPool,
    commitment: Commitment,
}

impl SnapshotComposer {
    pub fn new(
        rpc: Arc<dyn LedgerRpc>,
        retry: RetryingRpcClient,
        pool: EndpointPool,
        commitment: Commitment,
    ) -> Self {
        Self {
            rpc,
            retry,
            pool,
            commitment,
        }
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    pub fn retry_client(&self) -> &RetryingRpcClient {
        &self.retry
    }

    /// Fetch one snapshot, failing over between endpoints as needed.
    pub async fn fetch_snapshot(&mut self) -> Result<RawSnapshot> {
        let rpc = Arc::clone(&self.rpc);
        let commitment = self.commitment;

        self.retry
            .execute(&mut self.pool, move |endpoint| {
                let rpc = Arc::clone(&rpc);
                async move { fetch_once(rpc.as_ref(), &endpoint, commitment).await }
            })
            .await
    }
}

/// One attempt: all four queries against `endpoint`, first failure wins.
async fn fetch_once(
    rpc: &dyn LedgerRpc,
    endpoint: &Endpoint,
    commitment: Commitment,
) -> Result<RawSnapshot> {
    let (block_height, slot, total_supply, samples) = tokio::try_join!(
        rpc.block_height(endpoint, commitment),
        rpc.slot(endpoint, commitment),
        rpc.total_supply(endpoint, commitment),
        rpc.recent_performance_samples(endpoint, 1),
    )?;

    debug!(endpoint = %endpoint, block_height, slot, "snapshot fetched");

    Ok(RawSnapshot {
        endpoint: endpoint.url().to_string(),
        block_height,
        slot,
        total_supply,
        performance: samples.into_iter().next(),
    })
}
