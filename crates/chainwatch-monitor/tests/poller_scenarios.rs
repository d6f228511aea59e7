use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chainwatch_monitor::{
    Clock, ConnectionState, DashboardState, MonitorConfig, MonitorMetrics, NetworkHealth, Poller,
    PollerState, StatusApi,
};
use chainwatch_rpc::fake::{FakeLedgerRpc, METHOD_SLOT};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::watch;
use tokio::time::Instant;
use tower::ServiceExt;

const A: &str = "https://rpc-a.example";
const B: &str = "https://rpc-b.example";

struct StepClock {
    secs: AtomicI64,
}

impl StepClock {
    fn new() -> Self {
        Self {
            secs: AtomicI64::new(0),
        }
    }
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

fn config(endpoints: &[&str]) -> MonitorConfig {
    MonitorConfig {
        endpoints: endpoints.iter().map(|s| s.to_string()).collect(),
        poll_interval_secs: 10,
        max_retries: 3,
        history_capacity: 10,
        ..MonitorConfig::default()
    }
}

fn poller(fake: &Arc<FakeLedgerRpc>, endpoints: &[&str]) -> (Poller, MonitorMetrics) {
    let metrics = MonitorMetrics::new();
    let poller = Poller::from_config(
        &config(endpoints),
        fake.clone(),
        metrics.clone(),
        Arc::new(StepClock::new()),
    )
    .unwrap();
    (poller, metrics)
}

async fn next(rx: &mut watch::Receiver<DashboardState>) -> DashboardState {
    rx.changed().await.unwrap();
    rx.borrow_and_update().clone()
}

#[tokio::test(start_paused = true)]
async fn test_failover_to_second_endpoint() {
    let fake = Arc::new(FakeLedgerRpc::new());
    fake.set_down(A, true);
    let (mut poller, metrics) = poller(&fake, &[A, B]);
    let mut rx = poller.subscribe();

    poller.start().unwrap();
    let state = next(&mut rx).await;

    assert_eq!(state.sequence, 1);
    assert_eq!(state.status.status, ConnectionState::Connected);
    assert_eq!(state.network_health, NetworkHealth::Normal);
    assert_eq!(state.endpoint.as_deref(), Some(B));
    assert_eq!(state.status.block_height, 250_000_000);
    assert_eq!(state.status.transaction_count, 4_000);
    assert_eq!(state.tps, 400.0);

    let rpc = metrics.rpc.snapshot();
    assert_eq!(rpc.attempts, 2);
    assert_eq!(rpc.rotations, 1);
    assert_eq!(rpc.exhausted, 0);

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_all_endpoints_down_publishes_error_and_keeps_running() {
    let fake = Arc::new(FakeLedgerRpc::new());
    fake.set_down(A, true);
    fake.set_down(B, true);
    let (mut poller, metrics) = poller(&fake, &[A, B]);
    let mut rx = poller.subscribe();

    let started = Instant::now();
    poller.start().unwrap();
    let first = next(&mut rx).await;

    assert_eq!(first.status.status, ConnectionState::Error);
    assert_eq!(first.network_health, NetworkHealth::Abnormal);
    assert_eq!(first.status.block_height, 0);
    assert_eq!(first.status.current_slot, 0);
    assert_eq!(first.tps, 0.0);
    assert!(!first.status.error.as_deref().unwrap_or("").is_empty());
    assert_eq!(poller.state(), PollerState::Running);

    let rpc = metrics.rpc.snapshot();
    assert_eq!(rpc.attempts, 3);
    assert_eq!(rpc.rotations, 2);
    assert_eq!(rpc.exhausted, 1);

    let second = next(&mut rx).await;
    assert_eq!(second.sequence, 2);
    assert_eq!(second.status.status, ConnectionState::Error);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(metrics.tick_failures_total.get(), 2);

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_failed_tick() {
    let fake = Arc::new(FakeLedgerRpc::new());
    fake.set_down(A, true);
    let (mut poller, _metrics) = poller(&fake, &[A]);
    let mut rx = poller.subscribe();

    poller.start().unwrap();
    let failed = next(&mut rx).await;
    assert_eq!(failed.status.status, ConnectionState::Error);

    fake.set_down(A, false);
    let recovered = next(&mut rx).await;
    assert_eq!(recovered.status.status, ConnectionState::Connected);
    assert!(recovered.status.error.is_none());
    assert_eq!(recovered.history.transaction_count.len(), 2);
    assert_eq!(recovered.history.transaction_count[0].value, 0.0);
    assert_eq!(recovered.history.transaction_count[1].value, 4_000.0);

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_history_window_slides_after_capacity() {
    let fake = Arc::new(FakeLedgerRpc::new());
    let (mut poller, _metrics) = poller(&fake, &[A]);
    let mut rx = poller.subscribe();

    fake.set_transactions(Some(1));
    poller.start().unwrap();
    let mut state = next(&mut rx).await;
    for count in 2..=10u64 {
        fake.set_transactions(Some(count));
        state = next(&mut rx).await;
    }

    let values: Vec<f64> = state.history.transaction_count.iter().map(|s| s.value).collect();
    assert_eq!(values, (1..=10).map(|v| v as f64).collect::<Vec<_>>());
    assert_eq!(state.history.transaction_count[0].label, "00:00:00");

    fake.set_transactions(Some(11));
    let state = next(&mut rx).await;
    let values: Vec<f64> = state.history.transaction_count.iter().map(|s| s.value).collect();
    assert_eq!(values, (2..=11).map(|v| v as f64).collect::<Vec<_>>());
    assert_eq!(state.history.tps.len(), 10);
    assert_eq!(state.history.tps[9].value, 1.1);
    assert_eq!(state.history.transaction_count[9].label, "00:01:40");

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_lets_in_flight_tick_finish_once() {
    let fake = Arc::new(FakeLedgerRpc::new());
    fake.set_latency(METHOD_SLOT, Duration::from_secs(3));
    let (mut poller, _metrics) = poller(&fake, &[A]);
    let mut rx = poller.subscribe();

    poller.start().unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    poller.stop();
    assert_eq!(poller.state(), PollerState::Stopped);

    let state = next(&mut rx).await;
    assert_eq!(state.sequence, 1);
    assert_eq!(state.status.status, ConnectionState::Connected);

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(rx.borrow().sequence, 1);
    assert_eq!(fake.started_total(A), 4);

    poller.shutdown().await;
    assert_eq!(poller.latest().sequence, 1);
}

#[tokio::test(start_paused = true)]
async fn test_status_api_serves_latest_publish() {
    let fake = Arc::new(FakeLedgerRpc::new());
    let (mut poller, metrics) = poller(&fake, &[A]);
    let mut rx = poller.subscribe();
    let router = StatusApi::new(poller.subscribe(), metrics).router();

    poller.start().unwrap();
    next(&mut rx).await;

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/api/v1/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let state: DashboardState = serde_json::from_slice(&body).unwrap();
    assert_eq!(state.sequence, 1);
    assert_eq!(state.endpoint.as_deref(), Some(A));

    let response = router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("chainwatch_ticks_total 1\n"));

    poller.shutdown().await;
}
