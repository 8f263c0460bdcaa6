// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP surface of the network scanner.

use crate::config::NetscanConfig;
use crate::scanner::{HostAnalyzer, PortScanner};
use crate::targets::expand_targets;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::Utc;
use dm_callback::CallbackReporter;
use dm_error::MeshError;
use dm_scan::{RecordSink, ScanRequest, TargetAnalyzer, run_scan};
use dm_telemetry::ServiceMetrics;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Collector name used in source paths and callbacks.
pub const COLLECTOR: &str = "network-scanner";

/// Shared state of the scanner service.
pub struct AppState {
    /// Event sink; `None` when the broker was unreachable at startup.
    pub sink: Option<Arc<dyn RecordSink>>,
    /// Service metrics.
    pub metrics: ServiceMetrics,
    /// Service configuration.
    pub config: NetscanConfig,
}

impl AppState {
    fn analyzer(&self) -> HostAnalyzer {
        HostAnalyzer::new(PortScanner::new(
            self.config.ports.clone(),
            self.config.connect_timeout,
            self.config.banner_timeout,
        ))
    }
}

/// API error rendered as `{"error": ...}`.
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

/// Single-target analysis request.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Host or CIDR to scan.
    pub target: String,
}

/// Single-target analysis response.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    /// Scanned hosts.
    pub hosts_scanned: usize,
    /// Records produced.
    pub records: Vec<serde_json::Value>,
}

/// Autonomous discovery response.
#[derive(Debug, Serialize)]
pub struct DiscoverResponse {
    /// Terminal scan status.
    pub status: String,
    /// Summary message.
    pub message: String,
    /// Echoed scan id.
    pub scan_id: String,
}

/// Build the Axum router with all scanner routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/ready", get(cmd_ready))
        .route("/metrics", get(cmd_metrics))
        .route("/api/v1/analyze", post(cmd_analyze))
        .route("/api/v1/discover", post(cmd_discover))
        .with_state(state)
}

async fn cmd_health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": COLLECTOR,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn cmd_ready(State(state): State<Arc<AppState>>) -> Response {
    if state.sink.is_some() {
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

async fn cmd_analyze(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    state.metrics.incr_http_requests();
    let hosts = expand_targets(&[req.target], 64)
        .map_err(|e: MeshError| ApiError(StatusCode::BAD_REQUEST, e.to_string()))?;

    let analyzer = state.analyzer();
    let mut records = Vec::new();
    for host in &hosts {
        let host_records = analyzer
            .analyze(host)
            .await
            .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        records.extend(host_records.into_iter().map(|r| r.data));
    }
    Ok(Json(AnalyzeResponse {
        hosts_scanned: hosts.len(),
        records,
    }))
}

async fn cmd_discover(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(req): Json<ScanRequest>,
) -> Result<Json<DiscoverResponse>, ApiError> {
    state.metrics.incr_http_requests();
    state.metrics.incr_scans_started();

    let sink = state
        .sink
        .clone()
        .ok_or_else(|| ApiError(StatusCode::SERVICE_UNAVAILABLE, "broker unavailable".into()))?;

    let api_key = headers
        .get("x-internal-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let reporter = CallbackReporter::new(
        req.scan_id.clone(),
        COLLECTOR,
        req.progress_url.clone(),
        req.complete_url.clone(),
        api_key,
    );

    let hosts = expand_targets(&req.targets, req.limits.max_targets)
        .map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))?;
    info!(scan_id = %req.scan_id, hosts = hosts.len(), "starting network discovery");

    let analyzer = state.analyzer();
    let outcome = run_scan(&analyzer, &hosts, sink.as_ref(), &reporter, &req.scan_id, "targets").await;
    state.metrics.incr_scans_completed();

    Ok(Json(DiscoverResponse {
        status: format!("{:?}", outcome.status).to_lowercase(),
        message: format!(
            "Scanned {}/{} targets, {} discoveries",
            outcome.analyzed, outcome.total, outcome.discovery_count
        ),
        scan_id: req.scan_id,
    }))
}
