// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use dm_dryrun::config::DryrunConfig;
use dm_dryrun::runtime::DockerRuntime;
use dm_dryrun::service::{AppState, build_app};
use dm_telemetry::ServiceMetrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Required configuration aborts startup with a diagnostic naming
    // every missing DRYRUN_* variable.
    let config = DryrunConfig::from_env().context("load DRYRUN_* configuration")?;
    dm_telemetry::init_tracing("dryrun-orchestrator", &config.log_level);

    let runtime = DockerRuntime::connect().context("connect to Docker daemon")?;
    info!("Docker client initialized");

    let key_preview: String = config.api_key.chars().take(8).collect();
    info!(api_key_preview = %format!("{key_preview}..."), "authentication configured");

    let bind = config.http.bind_addr();
    let state = Arc::new(AppState {
        runtime: Arc::new(runtime),
        config,
        active_sessions: Mutex::new(HashMap::new()),
        http: reqwest::Client::new(),
        metrics: ServiceMetrics::new(),
    });

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(addr = %bind, "dryrun-orchestrator listening");
    axum::serve(listener, build_app(state)).await?;
    Ok(())
}
