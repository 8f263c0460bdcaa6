// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use dm_events::{
    APPROVED_PATTERN, ConsumerBinding, DISCOVERY_EXCHANGE, EventConsumer, TRANSMITTER_QUEUE,
};
use dm_telemetry::ServiceMetrics;
use dm_transmitter::batch::BatchProcessor;
use dm_transmitter::breaker::CircuitBreaker;
use dm_transmitter::client::EgressClient;
use dm_transmitter::config::TransmitterConfig;
use dm_transmitter::encode::BatchEncoder;
use dm_transmitter::ledger::{BatchLedger, PgLedger};
use dm_transmitter::service::{AppState, build_app};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = TransmitterConfig::from_env().context("load TRANSMITTER_* configuration")?;
    dm_telemetry::init_tracing("transmitter", &config.log_level);

    // Fatal startup: the ledger must be reachable and migrated.
    let ledger = PgLedger::connect(&config.database_url)
        .await
        .context("open batch ledger")?;
    ledger.migrate().await.context("migrate batch ledger")?;

    let client = EgressClient::new(
        config.destination_url.clone(),
        config.auth_token.clone(),
        config.retry.clone(),
        CircuitBreaker::new(config.circuit_failure_threshold, config.circuit_reset_timeout),
    );
    let encoder = BatchEncoder::new(config.output_format, config.max_claims_per_entity);
    let batches = Arc::new(BatchProcessor::new(
        config.batch_size,
        config.batch_interval,
        config.limits,
        encoder,
        client,
        Box::new(ledger),
    ));

    // Consumer feeding the FIFO.
    let consumer = EventConsumer::connect(
        &config.broker.url,
        config.broker.prefetch,
        "transmitter",
        vec![ConsumerBinding::new(
            TRANSMITTER_QUEUE,
            DISCOVERY_EXCHANGE,
            APPROVED_PATTERN,
        )],
    )
    .await
    .context("connect consumer")?;
    consumer
        .declare_exchange(DISCOVERY_EXCHANGE)
        .await
        .context("declare discovery exchange")?;
    consumer.setup_queues().await.context("bind queues")?;

    let metrics = ServiceMetrics::new();
    let state = Arc::new(AppState {
        batches: batches.clone(),
        broker_connected: AtomicBool::new(true),
        ledger_healthy: AtomicBool::new(true),
        metrics: metrics.clone(),
    });

    // Batch loop.
    let loop_batches = batches.clone();
    tokio::spawn(async move {
        loop_batches.run().await;
    });

    // HTTP surface.
    let bind = config.http.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(addr = %bind, "transmitter listening");
    let app = build_app(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    // Consume approved events into the FIFO until the broker drops.
    let consumer_batches = batches.clone();
    let consumer_metrics = metrics.clone();
    consumer
        .run(move |event, _routing_key| {
            let batches = consumer_batches.clone();
            let metrics = consumer_metrics.clone();
            async move {
                metrics.incr_consumed();
                let item = serde_json::to_value(&event)
                    .unwrap_or_else(|_| serde_json::json!({ "data": event.data }));
                batches.add_item(item);
                Ok(())
            }
        })
        .await
        .context("consumer loop")?;

    batches.stop();
    Ok(())
}
