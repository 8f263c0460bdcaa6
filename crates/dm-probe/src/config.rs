// SPDX-License-Identifier: MIT OR Apache-2.0
//! Infra-probe service configuration (`INFRAPROBE_*`).

use dm_config::{BrokerConfig, ConfigError, EnvLoader, HttpServerConfig};

/// Runtime settings for the infra-probe service.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// HTTP listener.
    pub http: HttpServerConfig,
    /// Broker connection.
    pub broker: BrokerConfig,
    /// SSH connect timeout in seconds.
    pub ssh_timeout_s: u64,
    /// Per-command timeout in seconds.
    pub command_timeout_s: u64,
    /// Concurrent probe bound (semaphore permits).
    pub max_concurrent_probes: usize,
    /// Log level directive.
    pub log_level: String,
}

impl ProbeConfig {
    /// Load from `INFRAPROBE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(EnvLoader::from_env("INFRAPROBE"))
    }

    /// Load from an explicit loader (tests).
    pub fn load(env: EnvLoader) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpServerConfig::load(&env, 8030)?,
            broker: BrokerConfig::load(&env)?,
            ssh_timeout_s: env.parsed("ssh_timeout_s", 30)?,
            command_timeout_s: env.parsed("command_timeout_s", 60)?,
            max_concurrent_probes: env.parsed("max_concurrent_probes", 10)?,
            log_level: env.string("log_level", "info"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn defaults_apply() {
        let cfg = ProbeConfig::load(EnvLoader::from_map("INFRAPROBE", BTreeMap::new())).unwrap();
        assert_eq!(cfg.http.port, 8030);
        assert_eq!(cfg.max_concurrent_probes, 10);
        assert_eq!(cfg.ssh_timeout_s, 30);
        assert_eq!(cfg.command_timeout_s, 60);
    }

    #[test]
    fn overrides_apply() {
        let vars = BTreeMap::from([
            ("INFRAPROBE_MAX_CONCURRENT_PROBES".to_string(), "3".to_string()),
            ("INFRAPROBE_SSH_TIMEOUT_S".to_string(), "5".to_string()),
        ]);
        let cfg = ProbeConfig::load(EnvLoader::from_map("INFRAPROBE", vars)).unwrap();
        assert_eq!(cfg.max_concurrent_probes, 3);
        assert_eq!(cfg.ssh_timeout_s, 5);
    }
}
