//! Periodic poll loop and the state it publishes.
//!
//! `Poller` moves through `Idle -> Running -> Stopped`. While running, a single
//! tokio task performs one tick immediately and then one per interval. Ticks
//! never overlap. Each tick publishes a fresh [`DashboardState`] on a watch
//! channel, so subscribers always see the latest state and nothing queues.
//!
//! `stop()` cancels the loop. A tick already in flight finishes and publishes
//! once; no further tick starts.

use std::sync::Arc;
use std::time::Duration;

use chainwatch_rpc::{LedgerRpc, RetryingRpcClient, SnapshotComposer};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::history::{HistoryBuffer, HistoryWindows, SeriesKey};
use crate::metrics::MonitorMetrics;
use crate::status::{ChainStatus, NetworkHealth, StatusAggregator};

/// Lifecycle of a [`Poller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollerState {
    #[default]
    Idle,
    Running,
    /// Terminal.
    Stopped,
}

/// Source of tick timestamps and their chart labels.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Label stored with history samples, local wall-clock `HH:MM:SS`.
    fn time_label(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&Local).format("%H:%M:%S").to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Everything a consumer needs to render one update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardState {
    /// Number of completed ticks; 0 before the first one.
    pub sequence: u64,
    pub status: ChainStatus,
    pub tps: f64,
    pub network_health: NetworkHealth,
    /// Endpoint that served the snapshot, when the tick succeeded.
    pub endpoint: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub history: HistoryWindows,
}

impl DashboardState {
    pub fn initial() -> Self {
        let status = ChainStatus::disconnected();
        Self {
            sequence: 0,
            network_health: status.network_health(),
            status,
            tps: 0.0,
            endpoint: None,
            last_update: None,
            history: HistoryWindows::default(),
        }
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::initial()
    }
}

/// One poll tick worth of state: composer, aggregator, history and publisher.
pub struct PollCycle {
    composer: SnapshotComposer,
    aggregator: StatusAggregator,
    history: HistoryBuffer,
    clock: Arc<dyn Clock>,
    metrics: MonitorMetrics,
    publisher: watch::Sender<DashboardState>,
    sequence: u64,
}

impl PollCycle {
    pub fn new(
        composer: SnapshotComposer,
        aggregator: StatusAggregator,
        history_capacity: usize,
        clock: Arc<dyn Clock>,
        metrics: MonitorMetrics,
    ) -> (Self, watch::Receiver<DashboardState>) {
        let (publisher, updates) = watch::channel(DashboardState::initial());
        let cycle = Self {
            composer,
            aggregator,
            history: HistoryBuffer::new(history_capacity),
            clock,
            metrics,
            publisher,
            sequence: 0,
        };
        (cycle, updates)
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    /// Fetch, derive, record and publish. Never fails; RPC errors become an
    /// error-state status.
    pub async fn tick(&mut self) -> DashboardState {
        let outcome = self.composer.fetch_snapshot().await;
        let at = self.clock.now();
        let label = self.clock.time_label(at);

        if let Err(e) = &outcome {
            warn!(error = %e, "poll failed on every attempt");
        }

        let endpoint = outcome.as_ref().ok().map(|s| s.endpoint.clone());
        let status = self.aggregator.derive_status(&outcome);
        let tps = self.aggregator.tps(&status);

        self.history.append(
            SeriesKey::TransactionCount,
            label.clone(),
            status.transaction_count as f64,
        );
        self.history.append(SeriesKey::Tps, label, tps);
        self.metrics.record_tick(&status, tps);
        self.sequence += 1;

        let state = DashboardState {
            sequence: self.sequence,
            network_health: status.network_health(),
            status,
            tps,
            endpoint,
            last_update: Some(at),
            history: self.history.windows(),
        };
        self.publisher.send_replace(state.clone());
        state
    }
}

pub struct Poller {
    cycle: Option<PollCycle>,
    interval: Duration,
    state: PollerState,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    updates: watch::Receiver<DashboardState>,
}

impl Poller {
    /// Fails if `interval` is zero.
    pub fn new(
        cycle: PollCycle,
        updates: watch::Receiver<DashboardState>,
        interval: Duration,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(MonitorError::Config("poll interval must be > 0".into()));
        }
        Ok(Self {
            cycle: Some(cycle),
            interval,
            state: PollerState::Idle,
            cancel: CancellationToken::new(),
            task: None,
            updates,
        })
    }

    /// Build the whole pipeline from validated configuration.
    pub fn from_config(
        config: &MonitorConfig,
        rpc: Arc<dyn LedgerRpc>,
        metrics: MonitorMetrics,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let retry = RetryingRpcClient::with_metrics(config.retry_config(), metrics.rpc.clone());
        let composer =
            SnapshotComposer::new(rpc, retry, config.endpoint_pool()?, config.commitment);
        let (cycle, updates) = PollCycle::new(
            composer,
            config.aggregator(),
            config.history_capacity,
            clock,
            metrics,
        );
        Self::new(cycle, updates, config.poll_interval())
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// New receiver of published states. The current value is the latest state.
    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.updates.clone()
    }

    pub fn latest(&self) -> DashboardState {
        self.updates.borrow().clone()
    }

    /// Spawn the poll loop. Only valid from `Idle`.
    pub fn start(&mut self) -> Result<()> {
        let invalid = MonitorError::InvalidTransition {
            action: "start",
            state: self.state,
        };
        if self.state != PollerState::Idle {
            return Err(invalid);
        }
        let cycle = self.cycle.take().ok_or(invalid)?;

        info!(interval_secs = self.interval.as_secs_f64(), "poller started");
        self.state = PollerState::Running;
        self.task = Some(tokio::spawn(run_loop(
            cycle,
            self.interval,
            self.cancel.clone(),
        )));
        Ok(())
    }

    /// Cancel the loop. Idempotent. A poller stopped before starting never runs.
    pub fn stop(&mut self) {
        if self.state == PollerState::Stopped {
            return;
        }
        self.cancel.cancel();
        self.cycle = None;
        self.state = PollerState::Stopped;
        info!("poller stopped");
    }

    /// Stop and wait for an in-flight tick to finish.
    pub async fn shutdown(&mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "poll loop ended abnormally");
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_loop(mut cycle: PollCycle, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let state = cycle.tick().await;
        debug!(
            sequence = state.sequence,
            status = %state.status.status,
            tps = state.tps,
            "published dashboard state"
        );
    }

    debug!("poll loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ConnectionState;
    use chainwatch_rpc::fake::FakeLedgerRpc;
    use chainwatch_rpc::{Commitment, EndpointPool, RetryConfig};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct StepClock {
        secs: AtomicI64,
    }

    impl Clock for StepClock {
        fn now(&self) -> DateTime<Utc> {
            let secs = self.secs.fetch_add(10, Ordering::Relaxed);
            Utc.timestamp_opt(secs, 0).unwrap()
        }

        fn time_label(&self, at: DateTime<Utc>) -> String {
            at.format("%H:%M:%S").to_string()
        }
    }

    fn cycle(fake: Arc<FakeLedgerRpc>, urls: &[&str]) -> (PollCycle, watch::Receiver<DashboardState>) {
        let composer = SnapshotComposer::new(
            fake,
            RetryingRpcClient::new(RetryConfig::default()),
            EndpointPool::from_urls(urls.iter().copied()).unwrap(),
            Commitment::Finalized,
        );
        PollCycle::new(
            composer,
            StatusAggregator::default(),
            3,
            Arc::new(StepClock {
                secs: AtomicI64::new(0),
            }),
            MonitorMetrics::new(),
        )
    }

    #[test]
    fn test_initial_state_is_disconnected() {
        let state = DashboardState::initial();
        assert_eq!(state.sequence, 0);
        assert_eq!(state.status.status, ConnectionState::Disconnected);
        assert_eq!(state.network_health, NetworkHealth::Abnormal);
        assert!(state.last_update.is_none());
    }

    #[tokio::test]
    async fn test_tick_publishes_and_records_history() {
        let fake = Arc::new(FakeLedgerRpc::new());
        let (mut cycle, rx) = cycle(fake.clone(), &["https://a"]);

        fake.set_transactions(Some(100));
        let state = cycle.tick().await;

        assert_eq!(state.sequence, 1);
        assert_eq!(state.status.status, ConnectionState::Connected);
        assert_eq!(state.tps, 10.0);
        assert_eq!(state.endpoint.as_deref(), Some("https://a"));
        assert_eq!(state.history.transaction_count.len(), 1);
        assert_eq!(state.history.transaction_count[0].label, "00:00:00");
        assert_eq!(state.history.tps[0].value, 10.0);
        assert_eq!(*rx.borrow(), state);
    }

    #[tokio::test]
    async fn test_failed_tick_is_error_state_not_stale() {
        let fake = Arc::new(FakeLedgerRpc::new());
        let (mut cycle, _rx) = cycle(fake.clone(), &["https://a"]);

        let ok = cycle.tick().await;
        assert!(ok.status.is_connected());

        fake.set_down("https://a", true);
        let failed = cycle.tick().await;
        assert_eq!(failed.status.status, ConnectionState::Error);
        assert_eq!(failed.status.block_height, 0);
        assert_eq!(failed.status.transaction_count, 0);
        assert!(failed.endpoint.is_none());
        assert!(!failed.status.error.as_deref().unwrap_or("").is_empty());
        // Failed ticks still land in the history as zeros.
        assert_eq!(failed.history.transaction_count.len(), 2);
        assert_eq!(failed.history.transaction_count[1].value, 0.0);
        assert_eq!(failed.history.transaction_count[1].label, "00:00:10");
    }

    #[tokio::test]
    async fn test_history_capacity_applies_to_published_windows() {
        let fake = Arc::new(FakeLedgerRpc::new());
        let (mut cycle, _rx) = cycle(fake.clone(), &["https://a"]);

        for i in 1..=5u64 {
            fake.set_transactions(Some(i));
            cycle.tick().await;
        }

        let counts: Vec<f64> = cycle
            .history()
            .snapshot(SeriesKey::TransactionCount)
            .iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(counts, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let fake = Arc::new(FakeLedgerRpc::new());
        let (cycle, rx) = cycle(fake, &["https://a"]);
        assert!(matches!(
            Poller::new(cycle, rx, Duration::ZERO),
            Err(MonitorError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let fake = Arc::new(FakeLedgerRpc::new());
        let (cycle, rx) = cycle(fake, &["https://a"]);
        let mut poller = Poller::new(cycle, rx, Duration::from_secs(10)).unwrap();

        poller.start().unwrap();
        assert_eq!(poller.state(), PollerState::Running);
        assert!(matches!(
            poller.start(),
            Err(MonitorError::InvalidTransition {
                action: "start",
                state: PollerState::Running
            })
        ));
        poller.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_terminal() {
        let fake = Arc::new(FakeLedgerRpc::new());
        let (cycle, rx) = cycle(fake, &["https://a"]);
        let mut poller = Poller::new(cycle, rx, Duration::from_secs(10)).unwrap();

        poller.stop();
        poller.stop();
        assert_eq!(poller.state(), PollerState::Stopped);
        assert!(poller.start().is_err());
        poller.shutdown().await;
        assert_eq!(poller.latest().sequence, 0);
    }
}
