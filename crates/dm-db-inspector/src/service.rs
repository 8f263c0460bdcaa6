// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP surface of the DB inspector.

use crate::config::DbInspectorConfig;
use crate::connectors::{InspectTarget, connector_for, shape_records};
use async_trait::async_trait;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::Utc;
use dm_callback::CallbackReporter;
use dm_core::{DiscoveredRecord, Secret};
use dm_error::MeshError;
use dm_scan::{RecordSink, ScanRequest, TargetAnalyzer, run_scan};
use dm_telemetry::ServiceMetrics;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Collector name used in source paths and callbacks.
pub const COLLECTOR: &str = "db-inspector";

/// Shared state of the inspector service.
pub struct AppState {
    /// Event sink; `None` when the broker was unreachable at startup.
    pub sink: Option<Arc<dyn RecordSink>>,
    /// Service metrics.
    pub metrics: ServiceMetrics,
    /// Service configuration.
    pub config: DbInspectorConfig,
}

/// API error rendered as `{"error": ...}`.
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

/// Batch deep-inspection request.
#[derive(Debug, Deserialize)]
pub struct BatchInspectRequest {
    /// Targets with per-target credentials.
    pub targets: Vec<InspectTarget>,
    /// Scan the published events belong to, when orchestrated.
    #[serde(default)]
    pub scan_id: Option<String>,
}

/// Per-target outcome in the batch response.
#[derive(Debug, Serialize)]
pub struct TargetOutcome {
    /// `host:port` of the target.
    pub target: String,
    /// Whether inspection succeeded.
    pub success: bool,
    /// Records published for the target.
    pub records: usize,
    /// Classified failure, when unsuccessful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Batch deep-inspection response.
#[derive(Debug, Serialize)]
pub struct BatchInspectResponse {
    /// Targets inspected successfully.
    pub inspected: usize,
    /// Targets that failed.
    pub failed: usize,
    /// Per-target outcomes.
    pub outcomes: Vec<TargetOutcome>,
}

/// Autonomous discovery request: shared scan fields plus one credential
/// set and engine type applied to every `host:port` target.
#[derive(Debug, Deserialize)]
pub struct DbScanRequest {
    /// Shared scan fields.
    #[serde(flatten)]
    pub scan: ScanRequest,
    /// Engine type for every target.
    pub db_type: String,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: Secret<String>,
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

/// Build the Axum router with all inspector routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/ready", get(cmd_ready))
        .route("/metrics", get(cmd_metrics))
        .route("/api/v1/analyze", post(cmd_analyze))
        .route("/api/v1/discover", post(cmd_discover))
        .route("/api/v1/inspect/batch", post(cmd_inspect_batch))
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

/// Single-target inspection, returning records inline without publishing.
async fn cmd_analyze(
    State(state): State<Arc<AppState>>,
    Json(target): Json<InspectTarget>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.metrics.incr_http_requests();
    let connector = connector_for(&target.db_type)
        .map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))?;
    let inspection = connector
        .inspect(&target)
        .await
        .map_err(|e| ApiError(StatusCode::from_u16(e.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), e.to_string()))?;
    let records = shape_records(&target, &inspection);
    Ok(Json(json!({
        "target": target.label(),
        "records": records.iter().map(|r| r.data.clone()).collect::<Vec<_>>(),
    })))
}

/// Deep inspection of a batch of targets, publishing every record.
/// Per-target failures are aggregated; the batch itself succeeds.
async fn cmd_inspect_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchInspectRequest>,
) -> Result<Json<BatchInspectResponse>, ApiError> {
    state.metrics.incr_http_requests();
    let sink = state
        .sink
        .clone()
        .ok_or_else(|| ApiError(StatusCode::SERVICE_UNAVAILABLE, "broker unavailable".into()))?;

    let scan_id = req.scan_id.unwrap_or_default();
    let mut outcomes = Vec::new();
    let mut inspected = 0usize;
    let mut failed = 0usize;

    for target in &req.targets {
        let outcome = inspect_and_publish(target, sink.as_ref(), &scan_id).await;
        match &outcome {
            Ok(count) => {
                inspected += 1;
                state.metrics.incr_published();
                outcomes.push(TargetOutcome {
                    target: target.label(),
                    success: true,
                    records: *count,
                    error: None,
                });
            }
            Err(e) => {
                failed += 1;
                state.metrics.incr_failed();
                warn!(target = %target.label(), error = %e, "target inspection failed");
                outcomes.push(TargetOutcome {
                    target: target.label(),
                    success: false,
                    records: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    info!(inspected, failed, "batch inspection finished");
    Ok(Json(BatchInspectResponse {
        inspected,
        failed,
        outcomes,
    }))
}

async fn inspect_and_publish(
    target: &InspectTarget,
    sink: &dyn RecordSink,
    scan_id: &str,
) -> Result<usize, MeshError> {
    let connector = connector_for(&target.db_type)?;
    let inspection = connector.inspect(target).await?;
    let records = shape_records(target, &inspection);
    for record in &records {
        sink.publish(record, scan_id).await?;
    }
    Ok(records.len())
}

/// Scan-engine adapter: one credential set over `host:port` targets.
struct DbAnalyzer {
    db_type: String,
    username: String,
    password: String,
}

#[async_trait]
impl TargetAnalyzer for DbAnalyzer {
    type Target = String;

    fn label(&self, target: &String) -> String {
        target.clone()
    }

    async fn analyze(&self, target: &String) -> Result<Vec<DiscoveredRecord>, MeshError> {
        let (host, port) = target
            .rsplit_once(':')
            .and_then(|(h, p)| p.parse::<u16>().ok().map(|p| (h.to_string(), p)))
            .ok_or_else(|| MeshError::validation(format!("invalid target: {target}")))?;
        let inspect_target = InspectTarget {
            host,
            port,
            db_type: self.db_type.clone(),
            username: self.username.clone(),
            password: Secret::new(self.password.clone()),
            database: None,
        };
        let connector = connector_for(&inspect_target.db_type)?;
        let inspection = connector.inspect(&inspect_target).await?;
        Ok(shape_records(&inspect_target, &inspection))
    }
}

async fn cmd_discover(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(req): Json<DbScanRequest>,
) -> Result<Json<DiscoverResponse>, ApiError> {
    state.metrics.incr_http_requests();
    state.metrics.incr_scans_started();

    // Reject unknown engines before any callback fires.
    connector_for(&req.db_type).map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))?;

    let sink = state
        .sink
        .clone()
        .ok_or_else(|| ApiError(StatusCode::SERVICE_UNAVAILABLE, "broker unavailable".into()))?;

    let api_key = headers
        .get("x-internal-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let reporter = CallbackReporter::new(
        req.scan.scan_id.clone(),
        COLLECTOR,
        req.scan.progress_url.clone(),
        req.scan.complete_url.clone(),
        api_key,
    );

    let analyzer = DbAnalyzer {
        db_type: req.db_type,
        username: req.username,
        password: req.password.into_inner(),
    };
    let mut targets = req.scan.targets.clone();
    targets.truncate(req.scan.limits.max_targets);

    let outcome = run_scan(
        &analyzer,
        &targets,
        sink.as_ref(),
        &reporter,
        &req.scan.scan_id,
        "targets",
    )
    .await;
    state.metrics.incr_scans_completed();

    Ok(Json(DiscoverResponse {
        status: format!("{:?}", outcome.status).to_lowercase(),
        message: format!(
            "Inspected {}/{} targets, {} discoveries",
            outcome.analyzed, outcome.total, outcome.discovery_count
        ),
        scan_id: req.scan.scan_id,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_request_parses_with_secret_passwords() {
        let req: BatchInspectRequest = serde_json::from_str(
            r#"{
                "targets": [{
                    "host": "db1",
                    "port": 5432,
                    "db_type": "postgresql",
                    "username": "u",
                    "password": "pw1"
                }],
                "scan_id": "scan-3"
            }"#,
        )
        .unwrap();
        assert_eq!(req.targets.len(), 1);
        let rendered = format!("{req:?}");
        assert!(!rendered.contains("pw1"));
    }

    #[test]
    fn scan_request_flattens() {
        let req: DbScanRequest = serde_json::from_str(
            r#"{
                "scan_id": "s1",
                "targets": ["db1:5432"],
                "progress_url": "http://api/p",
                "complete_url": "http://api/c",
                "db_type": "postgresql",
                "username": "u",
                "password": "pw"
            }"#,
        )
        .unwrap();
        assert_eq!(req.scan.targets, vec!["db1:5432"]);
        assert_eq!(req.db_type, "postgresql");
    }

    #[tokio::test]
    async fn db_analyzer_rejects_malformed_targets() {
        let analyzer = DbAnalyzer {
            db_type: "postgresql".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
        };
        let err = analyzer.analyze(&"no-port".to_string()).await.unwrap_err();
        assert_eq!(err.code, dm_error::ErrorCode::ValidationFailed);
    }
}
