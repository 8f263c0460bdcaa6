// SPDX-License-Identifier: MIT OR Apache-2.0
//! Code analyzer configuration (`CODEANALYZER_*`).

use dm_config::{BrokerConfig, ConfigError, EnvLoader, HttpServerConfig};

/// Directory names never descended into.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "venv",
    ".venv",
    "__pycache__",
    "target",
    "dist",
    "build",
    ".idea",
];

/// Runtime settings for the code analyzer.
#[derive(Debug, Clone)]
pub struct CodeAnalyzerConfig {
    /// HTTP listener.
    pub http: HttpServerConfig,
    /// Broker connection.
    pub broker: BrokerConfig,
    /// Root of the sample repositories for autonomous scans.
    pub sample_repos_path: String,
    /// Mount root scanned by the dry-run endpoint.
    pub dryrun_mount_path: String,
    /// Directory names to skip.
    pub excluded_dirs: Vec<String>,
    /// File size cap for metrics and language tallies.
    pub max_file_size_kb: u64,
    /// Path of the EOL data file. Lookups are disabled when the file
    /// is absent.
    pub eol_data_path: String,
    /// Log level directive.
    pub log_level: String,
}

impl CodeAnalyzerConfig {
    /// Load from `CODEANALYZER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(EnvLoader::from_env("CODEANALYZER"))
    }

    /// Load from an explicit loader (tests).
    pub fn load(env: EnvLoader) -> Result<Self, ConfigError> {
        let excluded = env.list("excluded_dirs");
        Ok(Self {
            http: HttpServerConfig::load(&env, 8001)?,
            broker: BrokerConfig::load(&env)?,
            sample_repos_path: env.string("sample_repos_path", "/repos"),
            dryrun_mount_path: env.string("dryrun_mount_path", "/app"),
            excluded_dirs: if excluded.is_empty() {
                DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect()
            } else {
                excluded
            },
            max_file_size_kb: env.parsed("max_file_size_kb", 1024)?,
            eol_data_path: env.string("eol_data_path", "data/eol_data.json"),
            log_level: env.string("log_level", "info"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn defaults() {
        let cfg =
            CodeAnalyzerConfig::load(EnvLoader::from_map("CODEANALYZER", BTreeMap::new())).unwrap();
        assert_eq!(cfg.http.port, 8001);
        assert_eq!(cfg.sample_repos_path, "/repos");
        assert!(cfg.excluded_dirs.contains(&".git".to_string()));
        assert_eq!(cfg.max_file_size_kb, 1024);
        assert_eq!(cfg.eol_data_path, "data/eol_data.json");
    }

    #[test]
    fn excluded_dirs_override() {
        let vars = BTreeMap::from([(
            "CODEANALYZER_EXCLUDED_DIRS".to_string(),
            ".git,vendor".to_string(),
        )]);
        let cfg = CodeAnalyzerConfig::load(EnvLoader::from_map("CODEANALYZER", vars)).unwrap();
        assert_eq!(cfg.excluded_dirs, vec![".git", "vendor"]);
    }
}
