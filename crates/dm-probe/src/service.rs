// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP surface of the infra-probe service.

use crate::config::ProbeConfig;
use crate::credentials::ProbeCredentials;
use crate::probe::SshProbe;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use dm_callback::CallbackReporter;
use dm_core::{DiscoveredRecord, EntityKind, Secret};
use dm_error::{ErrorCode, MeshError};
use dm_scan::{RecordSink, ScanRequest, TargetAnalyzer, run_scan};
use dm_telemetry::ServiceMetrics;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Collector name used in source paths and callbacks.
pub const COLLECTOR: &str = "infra-probe";

/// Shared state of the probe service.
pub struct AppState {
    /// SSH probe executor.
    pub probe: Arc<SshProbe>,
    /// Event sink; `None` when the broker was unreachable at startup.
    pub sink: Option<Arc<dyn RecordSink>>,
    /// Service metrics.
    pub metrics: ServiceMetrics,
    /// Service configuration.
    pub config: ProbeConfig,
}

/// API error with status code, rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Build an error response.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response models
// ---------------------------------------------------------------------------

/// Single-target probe request. Secrets are opaque: formatting the request
/// never reveals them.
#[derive(Debug, Deserialize)]
pub struct ProbeRequest {
    /// Address to probe.
    pub target_ip: String,
    /// SSH port.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// SSH username.
    pub username: String,
    /// SSH password.
    #[serde(default)]
    pub password: Option<Secret<String>>,
    /// SSH private key.
    #[serde(default)]
    pub private_key: Option<Secret<String>>,
    /// Key passphrase.
    #[serde(default)]
    pub passphrase: Option<Secret<String>>,
    /// Reference to a network-scanner discovery.
    #[serde(default)]
    pub server_id: Option<String>,
    /// Scan this probe belongs to.
    #[serde(default)]
    pub scan_id: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

/// Response to a probe request.
#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    /// Probe identifier (`pending` until the background task assigns one).
    pub probe_id: String,
    /// Echoed target.
    pub target_ip: String,
    /// Whether the probe was accepted.
    pub accepted: bool,
    /// Status message.
    pub message: String,
}

/// Autonomous discovery request: shared scan fields plus one credential
/// set applied to every target endpoint (`ip` or `ip:port`).
#[derive(Debug, Deserialize)]
pub struct ProbeScanRequest {
    /// Shared scan fields.
    #[serde(flatten)]
    pub scan: ScanRequest,
    /// SSH username.
    pub username: String,
    /// SSH password.
    #[serde(default)]
    pub password: Option<Secret<String>>,
    /// SSH private key.
    #[serde(default)]
    pub private_key: Option<Secret<String>>,
    /// Key passphrase.
    #[serde(default)]
    pub passphrase: Option<Secret<String>>,
}

/// Response to a discovery request.
#[derive(Debug, Serialize)]
pub struct DiscoverResponse {
    /// Terminal scan status.
    pub status: String,
    /// Summary message.
    pub message: String,
    /// Echoed scan id.
    pub scan_id: String,
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Scan-engine adapter: probes one endpoint per target.
pub struct ProbeAnalyzer {
    probe: Arc<SshProbe>,
    credentials: ProbeCredentials,
}

impl ProbeAnalyzer {
    /// Build an analyzer holding the scan's credential set. Each target
    /// probe gets its own clone, scrubbed independently; the master copy is
    /// scrubbed when the analyzer drops.
    pub fn new(probe: Arc<SshProbe>, credentials: ProbeCredentials) -> Self {
        Self { probe, credentials }
    }
}

#[async_trait::async_trait]
impl TargetAnalyzer for ProbeAnalyzer {
    type Target = String;

    fn label(&self, target: &String) -> String {
        target.clone()
    }

    async fn analyze(&self, target: &String) -> Result<Vec<DiscoveredRecord>, MeshError> {
        let (ip, port) = split_endpoint(target)?;
        let result = self
            .probe
            .probe(ip, port, self.credentials.clone(), None)
            .await;
        if !result.success {
            return Err(MeshError::new(
                ErrorCode::ConnectFailed,
                result.error.unwrap_or_else(|| "probe failed".to_string()),
            ));
        }
        let data = serde_json::to_value(&result)
            .map_err(|e| MeshError::new(ErrorCode::Internal, e.to_string()))?;
        Ok(vec![DiscoveredRecord::new(EntityKind::Infrastructure, data)])
    }
}

fn split_endpoint(target: &str) -> Result<(String, u16), MeshError> {
    match target.rsplit_once(':') {
        None => Ok((target.to_string(), 22)),
        Some((ip, port)) => port
            .parse()
            .map(|p| (ip.to_string(), p))
            .map_err(|_| MeshError::validation(format!("invalid endpoint: {target}"))),
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the Axum router with all probe-service routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/ready", get(cmd_ready))
        .route("/metrics", get(cmd_metrics))
        .route("/api/v1/probe", post(cmd_probe))
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

async fn cmd_probe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProbeRequest>,
) -> Result<Json<ProbeResponse>, ApiError> {
    state.metrics.incr_http_requests();
    if req.password.is_none() && req.private_key.is_none() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "either password or private_key is required",
        ));
    }

    let credentials = ProbeCredentials::new(
        req.username.clone(),
        req.password.map(Secret::into_inner),
        req.private_key.map(Secret::into_inner),
        req.passphrase.map(Secret::into_inner),
    );

    info!(
        target = %format!("{}:{}", req.target_ip, req.port),
        user = %req.username,
        "probe request received"
    );

    let probe = state.probe.clone();
    let sink = state.sink.clone();
    let metrics = state.metrics.clone();
    let target_ip = req.target_ip.clone();
    let port = req.port;
    let server_id = req.server_id.clone();
    let scan_id = req.scan_id.clone();
    tokio::spawn(async move {
        let result = probe.probe(target_ip.clone(), port, credentials, server_id).await;
        if !result.success {
            metrics.incr_failed();
            return;
        }
        let Some(sink) = sink else { return };
        let data = match serde_json::to_value(&result) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "probe result serialisation failed");
                return;
            }
        };
        let record = DiscoveredRecord::new(EntityKind::Infrastructure, data);
        match sink
            .publish(&record, scan_id.as_deref().unwrap_or_default())
            .await
        {
            Ok(()) => metrics.incr_published(),
            Err(e) => {
                metrics.incr_failed();
                warn!(error = %e, "infrastructure publish failed");
            }
        }
    });

    Ok(Json(ProbeResponse {
        probe_id: "pending".to_string(),
        target_ip: req.target_ip,
        accepted: true,
        message: "Probe initiated".to_string(),
    }))
}

async fn cmd_discover(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(req): Json<ProbeScanRequest>,
) -> Result<Json<DiscoverResponse>, ApiError> {
    state.metrics.incr_http_requests();
    state.metrics.incr_scans_started();

    let sink = state
        .sink
        .clone()
        .ok_or_else(|| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "broker unavailable"))?;

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

    let credentials = ProbeCredentials::new(
        req.username,
        req.password.map(Secret::into_inner),
        req.private_key.map(Secret::into_inner),
        req.passphrase.map(Secret::into_inner),
    );
    let analyzer = ProbeAnalyzer::new(state.probe.clone(), credentials);

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
            "Probed {}/{} targets, {} discoveries",
            outcome.analyzed, outcome.total, outcome.discovery_count
        ),
        scan_id: req.scan.scan_id,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
