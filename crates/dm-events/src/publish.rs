// SPDX-License-Identifier: MIT OR Apache-2.0
//! Broker publisher: durable topic exchange, persistent delivery.

use crate::envelope::CloudEvent;
use dm_error::{ErrorCode, MeshError};
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, ExchangeKind};
use tokio::sync::Mutex;
use tracing::{debug, info};

const CONTENT_TYPE: &str = "application/cloudevents+json";
const PERSISTENT: u8 = 2;

/// Publishes CloudEvents onto one topic exchange.
///
/// The exchange is declared (topic, durable) lazily on first publish so a
/// service that never publishes does not touch the broker topology. The
/// publisher is owned by the surrounding service and injected where needed;
/// there is no process-global channel.
pub struct EventPublisher {
    channel: Channel,
    exchange: String,
    declared: Mutex<bool>,
}

impl EventPublisher {
    /// Wrap an open channel, targeting `exchange`.
    pub fn new(channel: Channel, exchange: impl Into<String>) -> Self {
        Self {
            channel,
            exchange: exchange.into(),
            declared: Mutex::new(false),
        }
    }

    /// The exchange this publisher targets.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    async fn ensure_exchange(&self) -> Result<(), MeshError> {
        let mut declared = self.declared.lock().await;
        if *declared {
            return Ok(());
        }
        self.channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MeshError::new(ErrorCode::BrokerDisconnected, e.to_string())
                    .with_context("exchange", self.exchange.clone())
            })?;
        *declared = true;
        info!(exchange = %self.exchange, "exchange declared");
        Ok(())
    }

    /// Publish one validated envelope with persistent delivery.
    pub async fn publish(&self, routing_key: &str, event: &CloudEvent) -> Result<(), MeshError> {
        event
            .validate()
            .map_err(|e| MeshError::new(ErrorCode::InvalidEnvelope, e.to_string()))?;
        self.ensure_exchange().await?;

        let props = BasicProperties::default()
            .with_content_type(CONTENT_TYPE.into())
            .with_message_id(event.id.as_str().into())
            .with_delivery_mode(PERSISTENT);

        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &event.to_bytes(),
                props,
            )
            .await
            .map_err(|e| {
                MeshError::new(ErrorCode::BrokerDisconnected, e.to_string())
                    .with_context("routing_key", routing_key.to_string())
            })?;
        confirm
            .await
            .map_err(|e| MeshError::new(ErrorCode::BrokerDisconnected, e.to_string()))?;

        debug!(
            event_type = %event.event_type,
            event_id = %event.id,
            routing_key,
            "event published"
        );
        Ok(())
    }
}
