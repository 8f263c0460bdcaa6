// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use dm_code_analyzer::config::CodeAnalyzerConfig;
use dm_code_analyzer::service::{AppState, COLLECTOR, build_app};
use dm_core::EolTable;
use dm_events::{DISCOVERY_EXCHANGE, EventPublisher};
use dm_scan::{EventSink, RecordSink};
use dm_telemetry::ServiceMetrics;
use lapin::{Connection, ConnectionProperties};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = CodeAnalyzerConfig::from_env().context("load CODEANALYZER_* configuration")?;
    dm_telemetry::init_tracing(COLLECTOR, &config.log_level);

    let eol_table = match EolTable::load(Path::new(&config.eol_data_path)) {
        Ok(table) => {
            info!(version = table.data_version(), "EOL data loaded");
            Some(table)
        }
        Err(e) => {
            warn!(path = %config.eol_data_path, error = %e, "EOL data unavailable, lookups disabled");
            None
        }
    };

    let sink: Option<Arc<dyn RecordSink>> =
        match Connection::connect(&config.broker.url, ConnectionProperties::default()).await {
            Ok(connection) => {
                let channel = connection
                    .create_channel()
                    .await
                    .context("open broker channel")?;
                let publisher = EventPublisher::new(channel, DISCOVERY_EXCHANGE);
                info!("broker connected");
                Some(Arc::new(EventSink::new(publisher, COLLECTOR)))
            }
            Err(e) => {
                warn!(error = %e, "broker unavailable, starting degraded");
                None
            }
        };

    let bind = config.http.bind_addr();
    let state = Arc::new(AppState {
        sink,
        metrics: ServiceMetrics::new(),
        config,
        eol_table,
    });

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(addr = %bind, "code-analyzer listening");
    axum::serve(listener, build_app(state)).await?;
    Ok(())
}
