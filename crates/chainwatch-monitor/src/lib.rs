#![warn(missing_docs)]

//! chainwatch monitor: poll loop, status derivation, history windows and the status API

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod metrics;
pub mod poller;
pub mod status;

pub use api::StatusApi;
pub use config::{BackoffConfig, BackoffPolicy, MonitorConfig, MAX_HISTORY_CAPACITY};
pub use error::{MonitorError, Result};
pub use history::{HistoryBuffer, HistorySample, HistoryWindows, SeriesKey};
pub use metrics::{Gauge, MonitorMetrics};
pub use poller::{Clock, DashboardState, PollCycle, Poller, PollerState, SystemClock};
pub use status::{ChainStatus, ConnectionState, NetworkHealth, StatusAggregator};
