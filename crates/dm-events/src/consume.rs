// SPDX-License-Identifier: MIT OR Apache-2.0
//! Broker consumer: durable queues, at-least-once dispatch.

use crate::envelope::CloudEvent;
use dm_error::{ErrorCode, MeshError};
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use std::future::Future;
use tracing::{error, info, warn};

/// One durable queue bound to an exchange with a routing pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerBinding {
    /// Queue name.
    pub queue: String,
    /// Exchange the queue binds to.
    pub exchange: String,
    /// Routing key or pattern (`discovered.server`, `approved.*`).
    pub routing_key: String,
}

impl ConsumerBinding {
    /// Convenience constructor.
    pub fn new(queue: &str, exchange: &str, routing_key: &str) -> Self {
        Self {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        }
    }
}

/// Consumes CloudEvents from a set of durable queue bindings.
///
/// Dispatch is at-least-once: handler failures nack with `requeue=true`,
/// while undecodable payloads are rejected without requeue so a poison
/// message cannot wedge the queue.
pub struct EventConsumer {
    channel: Channel,
    bindings: Vec<ConsumerBinding>,
    consumer_tag: String,
}

impl EventConsumer {
    /// Connect to the broker and open a channel with the given prefetch.
    pub async fn connect(
        url: &str,
        prefetch: u16,
        consumer_tag: &str,
        bindings: Vec<ConsumerBinding>,
    ) -> Result<Self, MeshError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| MeshError::new(ErrorCode::BrokerDisconnected, e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| MeshError::new(ErrorCode::BrokerDisconnected, e.to_string()))?;
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| MeshError::new(ErrorCode::BrokerDisconnected, e.to_string()))?;
        info!(prefetch, "broker connected");
        Ok(Self {
            channel,
            bindings,
            consumer_tag: consumer_tag.to_string(),
        })
    }

    /// Build a consumer over an already-open channel (tests, shared conns).
    pub fn from_channel(channel: Channel, consumer_tag: &str, bindings: Vec<ConsumerBinding>) -> Self {
        Self {
            channel,
            bindings,
            consumer_tag: consumer_tag.to_string(),
        }
    }

    /// Declare a durable topic exchange so queue bindings cannot race the
    /// first publisher.
    pub async fn declare_exchange(&self, exchange: &str) -> Result<(), MeshError> {
        self.channel
            .exchange_declare(
                exchange,
                lapin::ExchangeKind::Topic,
                lapin::options::ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MeshError::new(ErrorCode::BrokerDisconnected, e.to_string())
                    .with_context("exchange", exchange.to_string())
            })
    }

    /// Declare and bind every queue.
    pub async fn setup_queues(&self) -> Result<(), MeshError> {
        for binding in &self.bindings {
            self.channel
                .queue_declare(
                    &binding.queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    MeshError::new(ErrorCode::BrokerDisconnected, e.to_string())
                        .with_context("queue", binding.queue.clone())
                })?;
            self.channel
                .queue_bind(
                    &binding.queue,
                    &binding.exchange,
                    &binding.routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    MeshError::new(ErrorCode::BrokerDisconnected, e.to_string())
                        .with_context("queue", binding.queue.clone())
                })?;
            info!(
                queue = %binding.queue,
                routing_key = %binding.routing_key,
                "queue bound"
            );
        }
        Ok(())
    }

    /// Consume all bound queues until the broker connection drops.
    ///
    /// `handler` receives the decoded envelope and the delivery routing key.
    pub async fn run<H, Fut>(&self, handler: H) -> Result<(), MeshError>
    where
        H: Fn(CloudEvent, String) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<(), MeshError>> + Send,
    {
        let mut tasks = Vec::new();
        for binding in &self.bindings {
            let consumer = self
                .channel
                .basic_consume(
                    &binding.queue,
                    &format!("{}-{}", self.consumer_tag, binding.queue),
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| MeshError::new(ErrorCode::BrokerDisconnected, e.to_string()))?;

            let handler = handler.clone();
            let queue = binding.queue.clone();
            tasks.push(tokio::spawn(async move {
                let mut consumer = consumer;
                while let Some(delivery) = consumer.next().await {
                    let delivery = match delivery {
                        Ok(d) => d,
                        Err(e) => {
                            error!(queue = %queue, error = %e, "delivery error");
                            break;
                        }
                    };
                    let routing_key = delivery.routing_key.as_str().to_string();

                    match CloudEvent::from_bytes(&delivery.data) {
                        Err(e) => {
                            // Poison message: reject without requeue.
                            warn!(queue = %queue, error = %e, "invalid event payload");
                            let _ = delivery
                                .nack(BasicNackOptions {
                                    requeue: false,
                                    ..Default::default()
                                })
                                .await;
                        }
                        Ok(event) => match handler(event, routing_key).await {
                            Ok(()) => {
                                let _ = delivery.ack(BasicAckOptions::default()).await;
                            }
                            Err(e) => {
                                warn!(queue = %queue, error = %e, "handler failed, requeueing");
                                let _ = delivery
                                    .nack(BasicNackOptions {
                                        requeue: true,
                                        ..Default::default()
                                    })
                                    .await;
                            }
                        },
                    }
                }
            }));
        }

        for task in tasks {
            task.await
                .map_err(|e| MeshError::new(ErrorCode::Internal, e.to_string()))?;
        }
        Ok(())
    }
}
