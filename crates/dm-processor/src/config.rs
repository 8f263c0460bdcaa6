// SPDX-License-Identifier: MIT OR Apache-2.0
//! Processor service configuration (`PROCESSOR_*`).

use crate::redaction::RedactionConfig;
use dm_config::{BrokerConfig, ConfigError, EnvLoader, HttpServerConfig};

/// Runtime settings for the processor service.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// HTTP listener for health endpoints.
    pub http: HttpServerConfig,
    /// Broker connection; `prefetch` bounds in-flight messages.
    pub broker: BrokerConfig,
    /// Consumer tag prefix.
    pub consumer_tag: String,
    /// Redaction toggles.
    pub redaction: RedactionConfig,
    /// Log level directive.
    pub log_level: String,
}

impl ProcessorConfig {
    /// Load from `PROCESSOR_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(EnvLoader::from_env("PROCESSOR"))
    }

    /// Load from an explicit loader (tests).
    pub fn load(env: EnvLoader) -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpServerConfig::load(&env, 8010)?,
            broker: BrokerConfig::load(&env)?,
            consumer_tag: env.string("consumer_tag", "processor"),
            redaction: RedactionConfig {
                redact_emails: env.flag("redact_emails", true),
                redact_ips: env.flag("redact_ips", true),
                redact_usernames: env.flag("redact_usernames", true),
            },
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
        let cfg = ProcessorConfig::load(EnvLoader::from_map("PROCESSOR", BTreeMap::new())).unwrap();
        assert_eq!(cfg.http.port, 8010);
        assert_eq!(cfg.broker.prefetch, 10);
        assert!(cfg.redaction.redact_emails);
    }

    #[test]
    fn redaction_toggles() {
        let vars = BTreeMap::from([
            ("PROCESSOR_REDACT_IPS".to_string(), "false".to_string()),
            ("PROCESSOR_PREFETCH_COUNT".to_string(), "25".to_string()),
        ]);
        let cfg = ProcessorConfig::load(EnvLoader::from_map("PROCESSOR", vars)).unwrap();
        assert!(!cfg.redaction.redact_ips);
        assert!(cfg.redaction.redact_usernames);
        assert_eq!(cfg.broker.prefetch, 25);
    }
}
