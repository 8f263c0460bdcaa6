// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP surface of the dry-run orchestrator.

use crate::auth::verify_api_key;
use crate::config::DryrunConfig;
use crate::models::{
    CleanupRequest, CleanupResponse, ContainerStatus, ContainerSummary, SessionId,
    StartSessionRequest, StartSessionResponse,
};
use crate::runtime::{ContainerRuntime, ContainerSpec, short_id};
use axum::Json;
use axum::Router;
use axum::extract::{Path as AxPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use chrono::Utc;
use dm_telemetry::ServiceMetrics;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const STOP_TIMEOUT_S: i32 = 10;

/// Shared state of the orchestrator.
pub struct AppState {
    /// Container runtime (Docker in production).
    pub runtime: Arc<dyn ContainerRuntime>,
    /// Service configuration.
    pub config: DryrunConfig,
    /// Active sessions and their container ids.
    pub active_sessions: Mutex<HashMap<String, Vec<String>>>,
    /// HTTP client for collector triggering.
    pub http: reqwest::Client,
    /// Service metrics.
    pub metrics: ServiceMetrics,
}

/// API error rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status to respond with.
    pub status: StatusCode,
    /// Human-readable detail.
    pub detail: String,
}

impl ApiError {
    /// Build an error response.
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<(StatusCode, String)> for ApiError {
    fn from((status, detail): (StatusCode, String)) -> Self {
        Self { status, detail }
    }
}

/// Build the Axum router with all orchestrator routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        .route("/ready", get(cmd_ready))
        .route("/metrics", get(cmd_metrics))
        .route("/api/repos", get(cmd_repos))
        .route("/api/status", get(cmd_status))
        .route("/api/dryrun/start", post(cmd_start))
        .route("/api/dryrun/cleanup", post(cmd_cleanup))
        .route("/api/dryrun/{session_id}/containers", get(cmd_containers))
        .with_state(state)
}

async fn cmd_health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "dryrun-orchestrator",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn cmd_ready(State(state): State<Arc<AppState>>) -> Response {
    if state.runtime.ping().await {
        Json(json!({ "status": "ready", "docker": "connected" })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "docker": "unreachable" })),
        )
            .into_response()
    }
}

async fn cmd_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics.incr_http_requests();
    Json(state.metrics.snapshot().as_map())
}

/// Sample repositories available for dry-run sessions. Open endpoint.
async fn cmd_repos(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    state.metrics.incr_http_requests();
    let repos = enumerate_repos(&state.config.sample_repos_path);
    Ok(Json(json!({ "repos": repos, "count": repos.len() })))
}

/// Daemon reachability and active session count. Open endpoint.
async fn cmd_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics.incr_http_requests();
    let docker = state.runtime.ping().await;
    let sessions = state.active_sessions.lock().await.len();
    Json(json!({
        "docker": if docker { "connected" } else { "unreachable" },
        "active_sessions": sessions,
    }))
}

async fn cmd_start(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<StartSessionRequest>,
) -> Result<Json<StartSessionResponse>, ApiError> {
    state.metrics.incr_http_requests();
    verify_api_key(&headers, &state.config.api_key)?;

    let session_id = req.session_id;
    info!(session_id = %session_id, "starting dry-run session");

    {
        let sessions = state.active_sessions.lock().await;
        if sessions.contains_key(session_id.as_str()) {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                format!("Session {session_id} already active"),
            ));
        }
    }

    let network = state.config.docker_network.clone();
    if !state
        .runtime
        .network_exists(&network)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Network {network} not found. Ensure the shared network exists."),
        ));
    }

    let repos = enumerate_repos(&state.config.sample_repos_path);
    let host_root = state
        .config
        .sample_repos_host_path
        .clone()
        .unwrap_or_else(|| state.config.sample_repos_path.clone());

    let mut containers = Vec::new();
    let mut container_ids = Vec::new();
    for repo in &repos {
        let image = choose_image(Path::new(&state.config.sample_repos_path).join(repo));
        let spec = ContainerSpec {
            name: format!("dryrun-{}-{}", session_id.short(), repo),
            image: image.to_string(),
            network: network.clone(),
            host_repo_path: format!("{host_root}/{repo}"),
            repo_name: repo.clone(),
            session_id: session_id.as_str().to_string(),
        };
        match state.runtime.run_container(&spec).await {
            Ok(id) => {
                containers.push(ContainerSummary {
                    container_id: short_id(&id),
                    name: spec.name.clone(),
                    image: spec.image.clone(),
                    repo: repo.clone(),
                    status: "running".to_string(),
                });
                container_ids.push(id);
            }
            Err(e) => {
                // One bad image must not sink the whole session.
                error!(repo = %repo, error = %e, "failed to start container");
            }
        }
    }

    state
        .active_sessions
        .lock()
        .await
        .insert(session_id.as_str().to_string(), container_ids);

    // Trigger the code analyzer without holding up the session
    // response; failures are logged but the session stays up.
    let trigger_state = state.clone();
    let trigger_session = session_id.clone();
    tokio::spawn(async move {
        if let Err(e) = trigger_code_analyzer(&trigger_state, &trigger_session).await {
            warn!(
                session_id = %trigger_session,
                error = %e,
                "code-analyzer trigger failed, session continues"
            );
        }
    });

    Ok(Json(StartSessionResponse {
        container_count: containers.len(),
        network_name: network,
        containers,
    }))
}

async fn cmd_cleanup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CleanupRequest>,
) -> Result<Json<CleanupResponse>, ApiError> {
    state.metrics.incr_http_requests();
    verify_api_key(&headers, &state.config.api_key)?;

    let session_id = req.session_id;
    info!(session_id = %session_id, "cleaning up dry-run session");

    // Label query is the source of truth: it survives orchestrator
    // restarts and repeated cleanup calls.
    let labelled = state
        .runtime
        .list_session_containers(session_id.as_str())
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let mut cleaned = 0usize;
    let mut errors = Vec::new();
    for container in &labelled {
        match state
            .runtime
            .stop_and_remove(&container.container_id, STOP_TIMEOUT_S)
            .await
        {
            Ok(()) => {
                cleaned += 1;
                info!(container_id = %container.container_id, "container removed");
            }
            Err(e) => {
                let message =
                    format!("Failed to remove container {}: {e}", container.container_id);
                error!("{message}");
                errors.push(message);
            }
        }
    }

    // The shared network is never removed.
    state
        .active_sessions
        .lock()
        .await
        .remove(session_id.as_str());

    if !errors.is_empty() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Cleanup partially failed: {}", errors.join("; ")),
        ));
    }

    Ok(Json(CleanupResponse {
        cleaned_containers: cleaned,
        session_id,
    }))
}

async fn cmd_containers(
    State(state): State<Arc<AppState>>,
    AxPath(session_id): AxPath<String>,
) -> Result<Json<Vec<ContainerStatus>>, ApiError> {
    state.metrics.incr_http_requests();
    let session_id = SessionId::parse(&session_id)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
    let containers = state
        .runtime
        .list_session_containers(session_id.as_str())
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(containers))
}

async fn trigger_code_analyzer(state: &AppState, session_id: &SessionId) -> Result<(), String> {
    let url = format!("{}/api/v1/dryrun", state.config.code_analyzer_url);
    let resp = state
        .http
        .post(&url)
        .json(&json!({ "session_id": session_id.as_str() }))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("code analyzer returned {}", resp.status()));
    }
    info!(session_id = %session_id, "code analyzer triggered");
    Ok(())
}

/// Non-hidden directories under the sample repository root, sorted.
fn enumerate_repos(root: &str) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };
    let mut repos: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.'))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    repos.sort();
    repos
}

/// Pick a workload image from the repository's manifest files.
fn choose_image(repo: impl AsRef<Path>) -> &'static str {
    let repo = repo.as_ref();
    if repo.join("requirements.txt").exists() {
        "python:3.11-slim"
    } else if repo.join("package.json").exists() {
        "node:20-slim"
    } else if repo.join("pom.xml").exists() {
        "eclipse-temurin:17-jdk-alpine"
    } else if repo.join("go.mod").exists() {
        "golang:1.21-alpine"
    } else {
        "alpine:latest"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dm_config::EnvLoader;
    use dm_error::MeshError;
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fake runtime tracking containers per session.
    #[derive(Default)]
    struct FakeRuntime {
        containers: StdMutex<HashMap<String, Vec<ContainerStatus>>>,
        counter: AtomicUsize,
        fail_removals: bool,
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn network_exists(&self, _name: &str) -> Result<bool, MeshError> {
            Ok(true)
        }

        async fn run_container(&self, spec: &ContainerSpec) -> Result<String, MeshError> {
            let id = format!("c{:012}", self.counter.fetch_add(1, Ordering::SeqCst));
            self.containers
                .lock()
                .unwrap()
                .entry(spec.session_id.clone())
                .or_default()
                .push(ContainerStatus {
                    container_id: short_id(&id),
                    name: spec.name.clone(),
                    status: "running".into(),
                    image: spec.image.clone(),
                });
            Ok(id)
        }

        async fn list_session_containers(
            &self,
            session_id: &str,
        ) -> Result<Vec<ContainerStatus>, MeshError> {
            Ok(self
                .containers
                .lock()
                .unwrap()
                .get(session_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn stop_and_remove(
            &self,
            container_id: &str,
            _timeout_s: i32,
        ) -> Result<(), MeshError> {
            if self.fail_removals {
                return Err(MeshError::new(
                    dm_error::ErrorCode::Internal,
                    "daemon refused",
                ));
            }
            let mut all = self.containers.lock().unwrap();
            for list in all.values_mut() {
                list.retain(|c| c.container_id != container_id);
            }
            Ok(())
        }

        async fn ping(&self) -> bool {
            true
        }
    }

    fn test_state(repos_root: &str, fail_removals: bool) -> Arc<AppState> {
        let vars = BTreeMap::from([
            ("DRYRUN_POSTGRES_URL".to_string(), "postgres://x".to_string()),
            ("DRYRUN_RABBITMQ_URL".to_string(), "amqp://x".to_string()),
            ("DRYRUN_API_KEY".to_string(), "test-key".to_string()),
            ("DRYRUN_SAMPLE_REPOS_PATH".to_string(), repos_root.to_string()),
            // Unreachable analyzer: trigger failures must not fail sessions.
            (
                "DRYRUN_CODE_ANALYZER_URL".to_string(),
                "http://127.0.0.1:1".to_string(),
            ),
        ]);
        let config = DryrunConfig::load(EnvLoader::from_map("DRYRUN", vars)).unwrap();
        Arc::new(AppState {
            runtime: Arc::new(FakeRuntime {
                fail_removals,
                ..Default::default()
            }),
            config,
            active_sessions: Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
            metrics: ServiceMetrics::new(),
        })
    }

    fn repos_fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("shop")).unwrap();
        std::fs::write(dir.path().join("shop/requirements.txt"), "django\n").unwrap();
        std::fs::create_dir(dir.path().join("portal")).unwrap();
        std::fs::write(dir.path().join("portal/package.json"), "{}").unwrap();
        std::fs::create_dir(dir.path().join(".hidden")).unwrap();
        dir
    }

    fn auth_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-internal-api-key",
            axum::http::HeaderValue::from_static("test-key"),
        );
        headers
    }

    #[test]
    fn image_heuristic() {
        let dir = repos_fixture();
        assert_eq!(choose_image(dir.path().join("shop")), "python:3.11-slim");
        assert_eq!(choose_image(dir.path().join("portal")), "node:20-slim");
        assert_eq!(choose_image(dir.path().join("missing")), "alpine:latest");
    }

    #[test]
    fn repo_enumeration_skips_hidden() {
        let dir = repos_fixture();
        let repos = enumerate_repos(dir.path().to_str().unwrap());
        assert_eq!(repos, vec!["portal", "shop"]);
    }

    #[tokio::test]
    async fn start_session_runs_one_container_per_repo() {
        let dir = repos_fixture();
        let state = test_state(dir.path().to_str().unwrap(), false);

        let resp = cmd_start(
            State(state.clone()),
            auth_headers(),
            Json(StartSessionRequest {
                session_id: SessionId::parse("sess-1").unwrap(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(resp.0.container_count, 2);
        assert_eq!(resp.0.network_name, "discovery-network");
        assert!(state.active_sessions.lock().await.contains_key("sess-1"));
    }

    #[tokio::test]
    async fn duplicate_session_conflicts() {
        let dir = repos_fixture();
        let state = test_state(dir.path().to_str().unwrap(), false);
        let req = || {
            Json(StartSessionRequest {
                session_id: SessionId::parse("sess-dup").unwrap(),
            })
        };
        cmd_start(State(state.clone()), auth_headers(), req())
            .await
            .unwrap();
        let err = cmd_start(State(state), auth_headers(), req())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        // S5: first cleanup removes N containers; the second returns 0.
        let dir = repos_fixture();
        let state = test_state(dir.path().to_str().unwrap(), false);
        cmd_start(
            State(state.clone()),
            auth_headers(),
            Json(StartSessionRequest {
                session_id: SessionId::parse("sess-2").unwrap(),
            }),
        )
        .await
        .unwrap();

        let cleanup = |state: Arc<AppState>| {
            cmd_cleanup(
                State(state),
                auth_headers(),
                Json(CleanupRequest {
                    session_id: SessionId::parse("sess-2").unwrap(),
                }),
            )
        };
        let first = cleanup(state.clone()).await.unwrap();
        assert_eq!(first.0.cleaned_containers, 2);

        let second = cleanup(state).await.unwrap();
        assert_eq!(second.0.cleaned_containers, 0);
    }

    #[tokio::test]
    async fn cleanup_aggregates_partial_failures() {
        let dir = repos_fixture();
        let state = test_state(dir.path().to_str().unwrap(), true);
        cmd_start(
            State(state.clone()),
            auth_headers(),
            Json(StartSessionRequest {
                session_id: SessionId::parse("sess-3").unwrap(),
            }),
        )
        .await
        .unwrap();

        let err = cmd_cleanup(
            State(state),
            auth_headers(),
            Json(CleanupRequest {
                session_id: SessionId::parse("sess-3").unwrap(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.detail.starts_with("Cleanup partially failed"));
    }

    #[tokio::test]
    async fn protected_endpoints_require_key() {
        let dir = repos_fixture();
        let state = test_state(dir.path().to_str().unwrap(), false);
        let err = cmd_start(
            State(state),
            HeaderMap::new(),
            Json(StartSessionRequest {
                session_id: SessionId::parse("sess-4").unwrap(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}
