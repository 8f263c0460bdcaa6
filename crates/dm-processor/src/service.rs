// SPDX-License-Identifier: MIT OR Apache-2.0
//! Health surface of the processor service.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use chrono::Utc;
use dm_telemetry::ServiceMetrics;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared state of the processor's HTTP surface.
pub struct AppState {
    /// Whether the broker consumer is connected.
    pub broker_connected: AtomicBool,
    /// Service metrics.
    pub metrics: ServiceMetrics,
}

impl AppState {
    /// State with the given initial broker flag.
    pub fn new(metrics: ServiceMetrics, broker_connected: bool) -> Self {
        Self {
            broker_connected: AtomicBool::new(broker_connected),
            metrics,
        }
    }
}

/// Build the Axum router for health, readiness, and metrics.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/ready", get(cmd_ready))
        .route("/metrics", get(cmd_metrics))
        .with_state(state)
}

async fn cmd_health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "processor",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn cmd_ready(State(state): State<Arc<AppState>>) -> Response {
    if state.broker_connected.load(Ordering::Relaxed) {
        Json(json!({ "status": "ready", "broker": "connected" })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "broker": "disconnected" })),
        )
            .into_response()
    }
}

async fn cmd_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics.incr_http_requests();
    Json(state.metrics.snapshot().as_map())
}
