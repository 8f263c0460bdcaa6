// SPDX-License-Identifier: MIT OR Apache-2.0
//! Network scanner configuration (`NETSCAN_*`).

use crate::scanner::DEFAULT_PORTS;
use dm_config::{BrokerConfig, ConfigError, EnvLoader, HttpServerConfig};
use std::time::Duration;

/// Runtime settings for the network scanner.
#[derive(Debug, Clone)]
pub struct NetscanConfig {
    /// HTTP listener.
    pub http: HttpServerConfig,
    /// Broker connection.
    pub broker: BrokerConfig,
    /// Ports to probe on every host.
    pub ports: Vec<u16>,
    /// Per-connection timeout.
    pub connect_timeout: Duration,
    /// Banner read timeout.
    pub banner_timeout: Duration,
    /// Log level directive.
    pub log_level: String,
}

impl NetscanConfig {
    /// Load from `NETSCAN_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(EnvLoader::from_env("NETSCAN"))
    }

    /// Load from an explicit loader (tests).
    pub fn load(env: EnvLoader) -> Result<Self, ConfigError> {
        let ports = if env.list("ports").is_empty() {
            DEFAULT_PORTS.to_vec()
        } else {
            let mut parsed = Vec::new();
            for raw in env.list("ports") {
                parsed.push(raw.parse().map_err(|_| ConfigError::InvalidValue {
                    var: "NETSCAN_PORTS".to_string(),
                    reason: format!("invalid port: {raw}"),
                })?);
            }
            parsed
        };
        Ok(Self {
            http: HttpServerConfig::load(&env, 8002)?,
            broker: BrokerConfig::load(&env)?,
            ports,
            connect_timeout: Duration::from_millis(env.parsed("connect_timeout_ms", 1000)?),
            banner_timeout: Duration::from_millis(env.parsed("banner_timeout_ms", 2000)?),
            log_level: env.string("log_level", "info"),
        })
    }
}
