// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use dm_events::{DISCOVERY_EXCHANGE, EventPublisher};
use dm_probe::config::ProbeConfig;
use dm_probe::probe::SshProbe;
use dm_probe::service::{AppState, COLLECTOR, build_app};
use dm_scan::{EventSink, RecordSink};
use dm_telemetry::ServiceMetrics;
use lapin::{Connection, ConnectionProperties};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ProbeConfig::from_env().context("load INFRAPROBE_* configuration")?;
    dm_telemetry::init_tracing(COLLECTOR, &config.log_level);

    let probe = Arc::new(SshProbe::new(
        Duration::from_secs(config.ssh_timeout_s),
        Duration::from_secs(config.command_timeout_s),
        config.max_concurrent_probes,
    ));

    // The probe stays useful for synchronous results even when the broker
    // is down; readiness reports degraded until it comes back.
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
        probe,
        sink,
        metrics: ServiceMetrics::new(),
        config,
    });

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(addr = %bind, "infra-probe listening");
    axum::serve(listener, build_app(state)).await?;
    Ok(())
}
