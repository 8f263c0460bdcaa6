// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP surface of the code analyzer.

use crate::analyzer::{RepoAnalyzer, enumerate_repos};
use crate::config::CodeAnalyzerConfig;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::Utc;
use dm_callback::CallbackReporter;
use dm_core::EolTable;
use dm_scan::{RecordSink, ScanRequest, run_scan};
use dm_telemetry::ServiceMetrics;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Collector name used in source paths and callbacks.
pub const COLLECTOR: &str = "code-analyzer";

/// Shared state of the analyzer service.
pub struct AppState {
    /// Event sink; `None` when the broker was unreachable at startup.
    pub sink: Option<Arc<dyn RecordSink>>,
    /// Service metrics.
    pub metrics: ServiceMetrics,
    /// Service configuration.
    pub config: CodeAnalyzerConfig,
    /// Loaded EOL table, when configured.
    pub eol_table: Option<EolTable>,
}

impl AppState {
    fn analyzer(&self) -> RepoAnalyzer {
        RepoAnalyzer::new(
            self.config.excluded_dirs.clone(),
            self.config.max_file_size_kb,
            self.eol_table.clone(),
        )
    }
}

/// API error rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

/// Single-repository analysis request.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Filesystem path of the repository.
    pub path: String,
}

/// Dry-run trigger request from the orchestrator.
#[derive(Debug, Deserialize)]
pub struct DryrunRequest {
    /// Dry-run session id; becomes the scan id for published events.
    pub session_id: String,
}

/// Response of `/api/v1/dryrun`.
#[derive(Debug, Serialize)]
pub struct DryrunResponse {
    /// Repositories analysed.
    pub repos_scanned: usize,
    /// Events published.
    pub discoveries: u64,
    /// Echoed session id.
    pub session_id: String,
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

/// Build the Axum router with all analyzer routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/ready", get(cmd_ready))
        .route("/metrics", get(cmd_metrics))
        .route("/api/v1/analyze", post(cmd_analyze))
        .route("/api/v1/discover", post(cmd_discover))
        .route("/api/v1/dryrun", post(cmd_dryrun))
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
) -> Result<Json<serde_json::Value>, ApiError> {
    state.metrics.incr_http_requests();
    let analyzer = state.analyzer();
    let analysis = analyzer
        .analyze_repo(&PathBuf::from(&req.path))
        .map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))?;

    Ok(Json(json!({
        "analysis_id": analysis.analysis_id,
        "repository_url": analysis.repository_url,
        "languages": analysis.languages,
        "frameworks": analysis.frameworks,
        "dependencies": analysis.dependencies,
        "metrics": analysis.metrics,
        "eol_findings": analysis.eol_findings,
    })))
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

    let scan_paths = if req.scan_paths.is_empty() {
        vec![state.config.sample_repos_path.clone()]
    } else {
        req.scan_paths.clone()
    };
    let repos = enumerate_repos(&scan_paths, req.limits.max_targets);
    info!(scan_id = %req.scan_id, repos = repos.len(), "starting repository discovery");

    let analyzer = state.analyzer();
    let outcome = run_scan(&analyzer, &repos, sink.as_ref(), &reporter, &req.scan_id, "repos").await;
    state.metrics.incr_scans_completed();

    Ok(Json(DiscoverResponse {
        status: format!("{:?}", outcome.status).to_lowercase(),
        message: format!(
            "Discovered {} items from {}/{} repositories",
            outcome.discovery_count, outcome.analyzed, outcome.total
        ),
        scan_id: req.scan_id,
    }))
}

/// Dry-run analysis: scan the container mount root directly, publishing
/// under the session id. No callbacks; the orchestrator polls status
/// through the mesh instead.
async fn cmd_dryrun(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DryrunRequest>,
) -> Result<Json<DryrunResponse>, ApiError> {
    state.metrics.incr_http_requests();
    let sink = state
        .sink
        .clone()
        .ok_or_else(|| ApiError(StatusCode::SERVICE_UNAVAILABLE, "broker unavailable".into()))?;

    let repos = enumerate_repos(&[state.config.dryrun_mount_path.clone()], 100);
    info!(session_id = %req.session_id, repos = repos.len(), "dry-run analysis triggered");

    let analyzer = state.analyzer();
    let mut repos_scanned = 0usize;
    let mut discoveries = 0u64;
    for repo in &repos {
        let Ok(analysis) = analyzer.analyze_repo(repo) else {
            continue;
        };
        let records = analyzer.records_for(&analysis);
        let mut all_published = true;
        for record in &records {
            match sink.publish(record, &req.session_id).await {
                Ok(()) => discoveries += 1,
                Err(_) => {
                    all_published = false;
                    break;
                }
            }
        }
        // A repository counts only after every record made it out.
        if all_published {
            repos_scanned += 1;
        }
    }

    Ok(Json(DryrunResponse {
        repos_scanned,
        discoveries,
        session_id: req.session_id,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dm_config::EnvLoader;
    use dm_core::DiscoveredRecord;
    use dm_error::MeshError;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSink {
        published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl RecordSink for CapturingSink {
        async fn publish(&self, record: &DiscoveredRecord, scan_id: &str) -> Result<(), MeshError> {
            self.published
                .lock()
                .unwrap()
                .push((scan_id.to_string(), record.kind.to_string()));
            Ok(())
        }
    }

    fn state_with_repos(root: &str) -> (Arc<AppState>, Arc<CapturingSink>) {
        let sink = Arc::new(CapturingSink::default());
        let vars = BTreeMap::from([
            (
                "CODEANALYZER_DRYRUN_MOUNT_PATH".to_string(),
                root.to_string(),
            ),
            (
                "CODEANALYZER_SAMPLE_REPOS_PATH".to_string(),
                root.to_string(),
            ),
        ]);
        let config = CodeAnalyzerConfig::load(EnvLoader::from_map("CODEANALYZER", vars)).unwrap();
        let state = Arc::new(AppState {
            sink: Some(sink.clone() as Arc<dyn RecordSink>),
            metrics: ServiceMetrics::new(),
            config,
            eol_table: None,
        });
        (state, sink)
    }

    fn fixture(root: &std::path::Path) {
        let repo = root.join("shop");
        std::fs::create_dir(&repo).unwrap();
        std::fs::write(repo.join("app.py"), "import flask\n").unwrap();
        std::fs::write(repo.join("requirements.txt"), "flask==3.0\n").unwrap();
    }

    #[tokio::test]
    async fn analyze_endpoint_returns_full_report() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path());
        let (state, _sink) = state_with_repos(dir.path().to_str().unwrap());

        let resp = cmd_analyze(
            State(state),
            Json(AnalyzeRequest {
                path: dir.path().join("shop").to_string_lossy().into_owned(),
            }),
        )
        .await
        .unwrap();
        assert!(resp.0["languages"]["languages"]["Python"]["files"].is_u64());
        assert_eq!(resp.0["frameworks"][0]["name"], json!("Flask"));
    }

    #[tokio::test]
    async fn analyze_missing_path_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _sink) = state_with_repos(dir.path().to_str().unwrap());
        let err = cmd_analyze(
            State(state),
            Json(AnalyzeRequest {
                path: "/nope".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dryrun_publishes_under_session_subject() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path());
        let (state, sink) = state_with_repos(dir.path().to_str().unwrap());

        let resp = cmd_dryrun(
            State(state),
            Json(DryrunRequest {
                session_id: "sess-7".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(resp.0.repos_scanned, 1);
        // repository + codebase + 1 dependency
        assert_eq!(resp.0.discoveries, 3);
        let published = sink.published.lock().unwrap();
        assert!(published.iter().all(|(scan, _)| scan == "sess-7"));
        assert!(published.iter().any(|(_, kind)| kind == "repository"));
        assert!(published.iter().any(|(_, kind)| kind == "dependency"));
    }

}
