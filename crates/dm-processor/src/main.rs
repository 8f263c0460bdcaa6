// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result};
use dm_events::{
    CloudEvent, ConsumerBinding, DISCOVERY_EXCHANGE, ENRICHMENT_BINDINGS, EventConsumer,
    EventPublisher, PROCESSING_EXCHANGE, scored_key, scored_type,
};
use dm_processor::Processor;
use dm_processor::config::ProcessorConfig;
use dm_processor::service::{AppState, build_app};
use dm_telemetry::ServiceMetrics;
use lapin::{Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ProcessorConfig::from_env().context("load PROCESSOR_* configuration")?;
    dm_telemetry::init_tracing("processor", &config.log_level);

    let metrics = ServiceMetrics::new();
    let processor = Arc::new(Processor::new(config.redaction));

    // Publisher channel for scored events.
    let connection = Connection::connect(&config.broker.url, ConnectionProperties::default())
        .await
        .context("connect to broker")?;
    let publish_channel = connection
        .create_channel()
        .await
        .context("open publish channel")?;
    let publisher = Arc::new(EventPublisher::new(publish_channel, PROCESSING_EXCHANGE));

    // Consumer over the three enrichment queues.
    let bindings = ENRICHMENT_BINDINGS
        .iter()
        .map(|(queue, key)| ConsumerBinding::new(queue, DISCOVERY_EXCHANGE, key))
        .collect();
    let consumer = EventConsumer::connect(
        &config.broker.url,
        config.broker.prefetch,
        &config.consumer_tag,
        bindings,
    )
    .await
    .context("connect consumer")?;
    consumer
        .declare_exchange(DISCOVERY_EXCHANGE)
        .await
        .context("declare discovery exchange")?;
    consumer.setup_queues().await.context("bind queues")?;

    // Health surface.
    let state = Arc::new(AppState::new(metrics.clone(), true));
    let bind = config.http.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(addr = %bind, "processor listening");
    let app = build_app(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    // Consume until the broker connection drops.
    let handler_metrics = metrics.clone();
    consumer
        .run(move |event: CloudEvent, routing_key: String| {
            let processor = processor.clone();
            let publisher = publisher.clone();
            let metrics = handler_metrics.clone();
            async move {
                metrics.incr_consumed();
                let entity = routing_key
                    .strip_prefix("discovered.")
                    .unwrap_or("unknown")
                    .to_string();
                info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    routing_key = %routing_key,
                    "message received"
                );

                let processed = processor.process(event.data.clone());

                let mut scored =
                    CloudEvent::new("/platform/processor", scored_type(&entity), processed)
                        .with_correlation(event.id.clone());
                if let Some(scan_id) = &event.subject {
                    scored = scored.with_subject(scan_id.clone());
                }
                publisher.publish(&scored_key(&entity), &scored).await?;
                metrics.incr_published();
                Ok(())
            }
        })
        .await
        .context("consumer loop")?;

    Ok(())
}
