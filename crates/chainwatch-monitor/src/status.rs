//! Presentation-ready chain status derived from raw snapshots.

use std::fmt;

use chainwatch_rpc::{RawSnapshot, RpcError};
use serde::{Deserialize, Serialize};

const UNKNOWN_ERROR: &str = "unknown error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    /// No poll has completed yet.
    #[default]
    Disconnected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkHealth {
    Normal,
    Abnormal,
}

/// Derived view of one poll. Numeric fields are zero unless connected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChainStatus {
    pub status: ConnectionState,
    pub block_height: u64,
    pub current_slot: u64,
    pub storage_usage: f64,
    pub transaction_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChainStatus {
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionState::Connected
    }

    pub fn network_health(&self) -> NetworkHealth {
        if self.is_connected() {
            NetworkHealth::Normal
        } else {
            NetworkHealth::Abnormal
        }
    }
}

/// Turns poll outcomes into [`ChainStatus`] values.
#[derive(Debug, Clone)]
pub struct StatusAggregator {
    lamports_per_token: f64,
    storage_scale: f64,
    sampling_window_secs: f64,
}

impl StatusAggregator {
    pub fn new(lamports_per_token: f64, storage_scale: f64, sampling_window_secs: f64) -> Self {
        Self {
            lamports_per_token,
            storage_scale,
            sampling_window_secs,
        }
    }

    pub fn derive_status(&self, outcome: &Result<RawSnapshot, RpcError>) -> ChainStatus {
        match outcome {
            Ok(snapshot) => self.connected_status(snapshot),
            Err(e) => Self::error_status(&e.to_string()),
        }
    }

    pub fn connected_status(&self, snapshot: &RawSnapshot) -> ChainStatus {
        ChainStatus {
            status: ConnectionState::Connected,
            block_height: snapshot.block_height,
            current_slot: snapshot.slot,
            storage_usage: self.storage_estimate(snapshot.total_supply),
            transaction_count: snapshot.transaction_count(),
            error: None,
        }
    }

    pub fn error_status(message: &str) -> ChainStatus {
        let message = message.trim();
        let message = if message.is_empty() {
            UNKNOWN_ERROR
        } else {
            message
        };

        ChainStatus {
            status: ConnectionState::Error,
            error: Some(message.to_string()),
            ..ChainStatus::default()
        }
    }

    /// `total_supply / lamports_per_token * storage_scale`
    pub fn storage_estimate(&self, total_supply: u64) -> f64 {
        total_supply as f64 / self.lamports_per_token * self.storage_scale
    }

    /// Transactions per second over the sampling window; 0 when not connected.
    pub fn tps(&self, status: &ChainStatus) -> f64 {
        if !status.is_connected() {
            return 0.0;
        }
        status.transaction_count as f64 / self.sampling_window_secs
    }
}

impl Default for StatusAggregator {
    fn default() -> Self {
        Self::new(1_000_000_000.0, 0.001, 10.0)
    }
}
