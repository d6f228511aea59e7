#![warn(missing_docs)]

//! chainwatch RPC subsystem: endpoint pool, failover retry, atomic ledger snapshots

pub mod client;
pub mod endpoint;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod metrics;
pub mod retry;
pub mod snapshot;

pub use client::{Commitment, HttpLedgerRpc, LedgerRpc, PerformanceSample};
pub use endpoint::{Endpoint, EndpointPool};
pub use error::{Result, RpcError};
pub use metrics::{Counter, RpcMetrics, RpcMetricsSnapshot};
pub use retry::{RetryConfig, RetryPolicy, RetryingRpcClient};
pub use snapshot::{RawSnapshot, SnapshotComposer};
