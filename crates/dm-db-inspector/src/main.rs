// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use dm_db_inspector::config::DbInspectorConfig;
use dm_db_inspector::service::{AppState, COLLECTOR, build_app};
use dm_events::{DISCOVERY_EXCHANGE, EventPublisher};
use dm_scan::{EventSink, RecordSink};
use dm_telemetry::ServiceMetrics;
use lapin::{Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = DbInspectorConfig::from_env().context("load DBINSPECTOR_* configuration")?;
    dm_telemetry::init_tracing(COLLECTOR, &config.log_level);

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
    });

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(addr = %bind, "db-inspector listening");
    axum::serve(listener, build_app(state)).await?;
    Ok(())
}
