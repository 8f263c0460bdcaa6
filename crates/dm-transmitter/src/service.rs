// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP surface of the transmitter service.

use crate::batch::BatchProcessor;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::Utc;
use dm_telemetry::ServiceMetrics;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared state of the transmitter's HTTP surface.
pub struct AppState {
    /// The batch processor (stats, breaker state).
    pub batches: Arc<BatchProcessor>,
    /// Whether the broker consumer is connected.
    pub broker_connected: AtomicBool,
    /// Whether the ledger answered its last health probe.
    pub ledger_healthy: AtomicBool,
    /// Service metrics.
    pub metrics: ServiceMetrics,
}

/// Body of `GET /api/v1/stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Items waiting in the FIFO.
    pub pending_items: usize,
    /// Batches accepted by the destination.
    pub batches_sent: u64,
    /// Batches that terminally failed.
    pub batches_failed: u64,
}

/// Build the Axum router for the transmitter.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/ready", get(cmd_ready))
        .route("/metrics", get(cmd_metrics))
        .route("/api/v1/stats", get(cmd_stats))
        .with_state(state)
}

async fn cmd_health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "transmitter",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn cmd_ready(State(state): State<Arc<AppState>>) -> Response {
    let circuit_open = state.batches.is_circuit_open();
    let broker = state.broker_connected.load(Ordering::Relaxed);
    let ledger = state.ledger_healthy.load(Ordering::Relaxed);
    let body = json!({
        "status": if broker && ledger && !circuit_open { "ready" } else { "degraded" },
        "broker": if broker { "connected" } else { "disconnected" },
        "ledger": if ledger { "healthy" } else { "unhealthy" },
        "circuit_breaker": if circuit_open { "open" } else { "closed" },
    });
    if broker && ledger && !circuit_open {
        Json(body).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

async fn cmd_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics.incr_http_requests();
    Json(state.metrics.snapshot().as_map())
}

async fn cmd_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    state.metrics.incr_http_requests();
    Json(StatsResponse {
        pending_items: state.batches.pending_count(),
        batches_sent: state.batches.batches_sent(),
        batches_failed: state.batches.batches_failed(),
    })
}
