// SPDX-License-Identifier: MIT OR Apache-2.0
//! DB inspector configuration (`DBINSPECTOR_*`).

use dm_config::{BrokerConfig, ConfigError, EnvLoader, HttpServerConfig};

/// Runtime settings for the DB inspector.
#[derive(Debug, Clone)]
pub struct DbInspectorConfig {
    /// HTTP listener.
    pub http: HttpServerConfig,
    /// Broker connection.
    pub broker: BrokerConfig,
    /// Log level directive.
    pub log_level: String,
}

impl DbInspectorConfig {
    /// Load from `DBINSPECTOR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(EnvLoader::from_env("DBINSPECTOR"))
    }

    /// Load from an explicit loader (tests).
    pub fn load(env: EnvLoader) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpServerConfig::load(&env, 8003)?,
            broker: BrokerConfig::load(&env)?,
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
            DbInspectorConfig::load(EnvLoader::from_map("DBINSPECTOR", BTreeMap::new())).unwrap();
        assert_eq!(cfg.http.port, 8003);
        assert_eq!(cfg.broker.exchange, "discovery.events");
    }
}
