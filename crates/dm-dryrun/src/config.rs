// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dry-run orchestrator configuration (`DRYRUN_*`).
//!
//! `DRYRUN_POSTGRES_URL`, `DRYRUN_RABBITMQ_URL`, and `DRYRUN_API_KEY`
//! are required; startup aborts with a diagnostic naming every missing
//! variable. Everything else has safe defaults.

use dm_config::{ConfigError, EnvLoader, HttpServerConfig};

/// Runtime settings for the dry-run orchestrator.
#[derive(Debug, Clone)]
pub struct DryrunConfig {
    /// HTTP listener.
    pub http: HttpServerConfig,
    /// Session bookkeeping database (required).
    pub postgres_url: String,
    /// Broker URL handed to collectors (required).
    pub rabbitmq_url: String,
    /// API key gating the Docker control endpoints (required).
    pub api_key: String,
    /// Directory containing sample repositories.
    pub sample_repos_path: String,
    /// Host-side path of the sample repositories, when the orchestrator
    /// itself runs in a container and bind mounts need host paths.
    pub sample_repos_host_path: Option<String>,
    /// Shared bridge network collectors reach containers on.
    pub docker_network: String,
    /// Code-analyzer base URL for dry-run triggering.
    pub code_analyzer_url: String,
    /// Log level directive.
    pub log_level: String,
}

impl DryrunConfig {
    /// Load from `DRYRUN_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(EnvLoader::from_env("DRYRUN"))
    }

    /// Load from an explicit loader (tests).
    pub fn load(mut env: EnvLoader) -> Result<Self, ConfigError> {
        let postgres_url = env.required("postgres_url");
        let rabbitmq_url = env.required("rabbitmq_url");
        let api_key = env.required("api_key");
        env.finish()?;

        Ok(Self {
            http: HttpServerConfig::load(&env, 8040)?,
            postgres_url,
            rabbitmq_url,
            api_key,
            sample_repos_path: env.string("sample_repos_path", "/repos"),
            sample_repos_host_path: env.optional("sample_repos_host_path"),
            docker_network: env.string("docker_network", "discovery-network"),
            code_analyzer_url: env.string("code_analyzer_url", "http://code-analyzer:8001"),
            log_level: env.string("log_level", "info"),
        })
    }
}
