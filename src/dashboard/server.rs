//! HTTP API and WebSocket dashboard server

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::MonitorError;
use crate::models::MonitorStatus;
use crate::modules::MonitorLoop;
use crate::utils::alerts::AlertRecord;
use crate::utils::{AlertService, MetricsService};

const DEFAULT_ALERT_LIMIT: usize = 50;

/// Query params for list endpoints
#[derive(Debug, Deserialize)]
pub struct ListParams {
    limit: Option<usize>,
}

/// API success response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    success: bool,
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    status: String,
    uptime: f64,
    monitor_running: bool,
}

/// WebSocket message types
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    #[serde(rename = "init")]
    Init {
        status: MonitorStatus,
        recent_alerts: Vec<AlertRecord>,
    },
    #[serde(rename = "alert")]
    Alert(AlertRecord),
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub monitor: MonitorLoop,
    pub alerts: Arc<AlertService>,
    pub metrics: Arc<MetricsService>,
    pub start_time: Instant,
}

/// Dashboard server
pub struct DashboardServer {
    port: u16,
    state: AppState,
}

impl DashboardServer {
    pub fn new(
        port: u16,
        monitor: MonitorLoop,
        alerts: Arc<AlertService>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        let state = AppState {
            monitor,
            alerts,
            metrics,
            start_time: Instant::now(),
        };

        Self { port, state }
    }

    /// Serve until the listener fails
    pub async fn start(&self) -> anyhow::Result<()> {
        let app = router(self.state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(target: "DASHBOARD", "✅ Dashboard running at http://localhost:{}", self.port);

        axum::serve(listener, app).await?;
        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/alerts", get(get_alerts))
        .route("/api/monitor/start", post(start_monitor))
        .route("/api/monitor/stop", post(stop_monitor))
        .route("/metrics", get(get_metrics))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================
// HANDLERS
// ============================================

async fn get_status(State(state): State<AppState>) -> Json<MonitorStatus> {
    Json(state.monitor.status())
}

async fn get_alerts(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Vec<AlertRecord>> {
    let limit = params.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
    Json(state.alerts.get_recent_alerts(limit))
}

async fn start_monitor(State(state): State<AppState>) -> Response {
    match state.monitor.start() {
        Ok(()) => Json(ApiResponse {
            success: true,
            message: "Monitor started".to_string(),
        })
        .into_response(),
        Err(e @ (MonitorError::AlreadyRunning | MonitorError::Stopping)) => (
            StatusCode::CONFLICT,
            Json(ApiResponse {
                success: false,
                message: e.to_string(),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse {
                success: false,
                message: e.to_string(),
            }),
        )
            .into_response(),
    }
}

async fn stop_monitor(State(state): State<AppState>) -> Json<ApiResponse> {
    state.monitor.stop().await;
    Json(ApiResponse {
        success: true,
        message: "Monitor stopped".to_string(),
    })
}

async fn get_metrics(State(state): State<AppState>) -> Response {
    state.metrics.set_running(state.monitor.is_running());

    match state.metrics.get_metrics() {
        Ok(metrics) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            metrics,
        )
            .into_response(),
        Err(e) => {
            error!(target: "DASHBOARD", "Metrics encoding failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime: state.start_time.elapsed().as_secs_f64(),
        monitor_running: state.monitor.is_running(),
    })
}

async fn readiness_check(State(state): State<AppState>) -> Response {
    if state.monitor.is_running() {
        Json(serde_json::json!({"ready": true})).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"ready": false})),
        )
            .into_response()
    }
}

/// Wait for either half of a socket session and abort the other
async fn first_to_finish(mut a: JoinHandle<()>, mut b: JoinHandle<()>) {
    tokio::select! {
        _ = &mut a => b.abort(),
        _ = &mut b => a.abort(),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    info!(target: "DASHBOARD", "WebSocket client connected");

    let init_msg = WsMessage::Init {
        status: state.monitor.status(),
        recent_alerts: state.alerts.get_recent_alerts(20),
    };
    if let Ok(json) = serde_json::to_string(&init_msg) {
        if sender.send(Message::Text(json)).await.is_err() {
            return;
        }
    }

    let mut alert_rx = state.alerts.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let alert = match alert_rx.recv().await {
                Ok(alert) => alert,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "DASHBOARD", "WebSocket client lagged, {} alerts dropped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if let Ok(json) = serde_json::to_string(&WsMessage::Alert(alert)) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // Pings are answered by axum; only watch for close
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    first_to_finish(send_task, recv_task).await;

    info!(target: "DASHBOARD", "WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{ActivityStats, CabalAlert, ClusterResult};
    use crate::modules::Collaborators;
    use crate::testing::{snapshot, CollectingSink, MapActivity, ScriptedFeed, StaticTraders};
    use crate::utils::alerts::{AlertSettings, NotificationSink};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let metrics = Arc::new(MetricsService::new().unwrap());
        let monitor = MonitorLoop::new(
            Collaborators {
                feed: Arc::new(ScriptedFeed::new(vec![])),
                traders: Arc::new(StaticTraders::new(&[])),
                activity: Arc::new(MapActivity::new(vec![])),
                sink: Arc::new(CollectingSink::new()),
                metrics: Arc::clone(&metrics),
            },
            &Config::default(),
        );

        AppState {
            monitor,
            alerts: Arc::new(AlertService::new(AlertSettings::default(), reqwest::Client::new())),
            metrics,
            start_time: Instant::now(),
        }
    }

    async fn call(state: &AppState, method: &str, uri: &str) -> (StatusCode, String) {
        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_and_status() {
        let state = state();

        let (status, body) = call(&state, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        let health: HealthResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(health.status, "healthy");
        assert!(!health.monitor_running);

        let (status, body) = call(&state, "GET", "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["running"], false);
        assert_eq!(json["trackedTokens"], 0);
        assert_eq!(json["priceThreshold"], 20.0);

        let (status, _) = call(&state, "GET", "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn start_stop_lifecycle() {
        let state = state();

        let (status, _) = call(&state, "POST", "/api/monitor/start").await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.monitor.is_running());

        let (status, body) = call(&state, "POST", "/api/monitor/start").await;
        assert_eq!(status, StatusCode::CONFLICT);
        let response: ApiResponse = serde_json::from_str(&body).unwrap();
        assert!(!response.success);

        let (status, _) = call(&state, "POST", "/api/monitor/stop").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.monitor.is_running());
    }

    #[tokio::test]
    async fn alerts_respect_limit() {
        let state = state();
        for id in ["ONE", "TWO", "THREE"] {
            let alert = CabalAlert {
                token: snapshot(id, 1.0),
                previous_price: 0.8,
                price_increase_pct: 25.0,
                suspicious: vec![],
                activity: ActivityStats::default(),
                cluster: ClusterResult::default(),
                watched_tokens: vec![],
                generated_at: Utc::now(),
            };
            state.alerts.deliver(&alert).await.unwrap();
        }

        let (status, body) = call(&state, "GET", "/api/alerts?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        let alerts: Vec<AlertRecord> = serde_json::from_str(&body).unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].title, "Cabal activity on THREE");
    }

    #[tokio::test]
    async fn metrics_are_plain_text() {
        let state = state();
        let (status, body) = call(&state, "GET", "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("cabalguard_monitor_running 0"));
    }

    #[tokio::test]
    async fn socket_halves_do_not_outlive_each_other() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let finished = tokio::spawn(async {});
        let lingering = tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        });

        first_to_finish(finished, lingering).await;

        // The aborted half drops its sender
        let closed = tokio::time::timeout(std::time::Duration::from_secs(2), rx).await;
        assert!(matches!(closed, Ok(Err(_))));
    }
}
