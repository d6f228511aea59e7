use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::history::HistoryWindows;
use crate::metrics::MonitorMetrics;
use crate::poller::DashboardState;

/// Read-only HTTP view of the latest published state.
#[derive(Clone)]
pub struct StatusApi {
    updates: watch::Receiver<DashboardState>,
    metrics: MonitorMetrics,
}

impl StatusApi {
    pub fn new(updates: watch::Receiver<DashboardState>, metrics: MonitorMetrics) -> Self {
        Self { updates, metrics }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/api/v1/status", get(status_handler))
            .route("/api/v1/history", get(history_handler))
            .with_state(Arc::new(self))
    }

    /// Bind `addr` and serve until `shutdown` is cancelled.
    pub async fn serve(self, addr: SocketAddr, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` is cancelled.
    pub async fn serve_on(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let router = self.router();
        tracing::info!("Status API listening on {}", listener.local_addr()?);

        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        Ok(())
    }

    fn latest(&self) -> DashboardState {
        self.updates.borrow().clone()
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

async fn status_handler(State(api): State<Arc<StatusApi>>) -> Json<DashboardState> {
    Json(api.latest())
}

async fn history_handler(State(api): State<Arc<StatusApi>>) -> Json<HistoryWindows> {
    Json(api.latest().history)
}

async fn metrics_handler(State(api): State<Arc<StatusApi>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        api.metrics.render_prometheus(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistorySample;
    use crate::status::StatusAggregator;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_body(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn api_with(state: DashboardState) -> (StatusApi, watch::Sender<DashboardState>) {
        let (tx, rx) = watch::channel(state);
        (StatusApi::new(rx, MonitorMetrics::new()), tx)
    }

    #[tokio::test]
    async fn test_health() {
        let (api, _tx) = api_with(DashboardState::initial());
        let (status, body) = get_body(api.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_status_before_first_tick_is_disconnected() {
        let (api, _tx) = api_with(DashboardState::initial());
        let (status, body) = get_body(api.router(), "/api/v1/status").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"]["status"], "disconnected");
        assert_eq!(json["sequence"], 0);
        assert_eq!(json["network_health"], "abnormal");
    }

    #[tokio::test]
    async fn test_status_reflects_latest_publish() {
        let (api, tx) = api_with(DashboardState::initial());
        let router = api.router();

        tx.send_replace(DashboardState {
            sequence: 7,
            status: StatusAggregator::error_status("all endpoints failed"),
            ..DashboardState::initial()
        });

        let (_, body) = get_body(router, "/api/v1/status").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["status"]["status"], "error");
        assert_eq!(json["status"]["error"], "all endpoints failed");
    }

    #[tokio::test]
    async fn test_history_endpoint() {
        let mut state = DashboardState::initial();
        state.history.transaction_count = vec![HistorySample::new("12:00:00", 40.0)];
        state.history.tps = vec![HistorySample::new("12:00:00", 4.0)];
        let (api, _tx) = api_with(state);

        let (_, body) = get_body(api.router(), "/api/v1/history").await;
        let windows: HistoryWindows = serde_json::from_str(&body).unwrap();
        assert_eq!(windows.transaction_count[0].value, 40.0);
        assert_eq!(windows.tps[0].label, "12:00:00");
    }

    #[tokio::test]
    async fn test_serve_fails_on_taken_address() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();
        let (api, _tx) = api_with(DashboardState::initial());

        let result = api.serve(addr, CancellationToken::new()).await;
        assert!(matches!(result, Err(crate::error::MonitorError::Io(_))));
    }

    #[tokio::test]
    async fn test_serve_on_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (api, _tx) = api_with(DashboardState::initial());
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(api.serve_on(listener, shutdown.clone()));

        shutdown.cancel();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (api, _tx) = api_with(DashboardState::initial());
        let (status, body) = get_body(api.router(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("chainwatch_ticks_total"));
        assert!(body.contains("chainwatch_rpc_rotations_total"));
    }
}
