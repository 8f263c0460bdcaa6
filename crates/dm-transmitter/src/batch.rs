// SPDX-License-Identifier: MIT OR Apache-2.0
//! The batching loop over the in-memory FIFO.

use crate::client::{EgressClient, SendOutcome, gzip_json};
use crate::encode::BatchEncoder;
use crate::ledger::BatchLedger;
use dm_error::MeshError;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// Size limits applied to the compressed batch payload.
#[derive(Debug, Clone, Copy)]
pub struct SizeLimits {
    /// Hard limit: larger batches are rejected and re-queued.
    pub max_bytes: usize,
    /// Soft limit: larger batches log a warning and proceed.
    pub warn_bytes: usize,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            warn_bytes: 1024 * 1024,
        }
    }
}

/// Processes approved discoveries in batches.
///
/// Items arrive from the broker consumer via [`add_item`] and leave in
/// FIFO order through [`flush`]. The batch loop flushes whenever the
/// queue reaches `batch_size`, or after `batch_interval` with whatever is
/// present.
///
/// [`add_item`]: BatchProcessor::add_item
/// [`flush`]: BatchProcessor::flush
pub struct BatchProcessor {
    batch_size: usize,
    batch_interval: Duration,
    limits: SizeLimits,
    encoder: BatchEncoder,
    client: EgressClient,
    ledger: Box<dyn BatchLedger>,
    queue: Mutex<VecDeque<Value>>,
    running: AtomicBool,
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
}

impl BatchProcessor {
    /// Assemble a processor from its collaborators.
    pub fn new(
        batch_size: usize,
        batch_interval: Duration,
        limits: SizeLimits,
        encoder: BatchEncoder,
        client: EgressClient,
        ledger: Box<dyn BatchLedger>,
    ) -> Self {
        Self {
            batch_size,
            batch_interval,
            limits,
            encoder,
            client,
            ledger,
            queue: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
            batches_sent: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
        }
    }

    /// Append an approved event to the FIFO.
    pub fn add_item(&self, item: Value) {
        let mut queue = self.queue.lock().expect("batch queue lock poisoned");
        queue.push_back(item);
    }

    /// Items waiting in the FIFO.
    pub fn pending_count(&self) -> usize {
        self.queue.lock().expect("batch queue lock poisoned").len()
    }

    /// Batches accepted by the destination.
    pub fn batches_sent(&self) -> u64 {
        self.batches_sent.load(Ordering::Relaxed)
    }

    /// Batches that terminally failed.
    pub fn batches_failed(&self) -> u64 {
        self.batches_failed.load(Ordering::Relaxed)
    }

    /// Whether the egress circuit breaker is open.
    pub fn is_circuit_open(&self) -> bool {
        self.client.is_circuit_open()
    }

    /// Stop the batch loop after its current iteration.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Run the batch loop until stopped. Remaining items are flushed on
    /// shutdown.
    pub async fn run(&self) {
        self.running.store(true, Ordering::Relaxed);
        info!(
            batch_size = self.batch_size,
            interval_s = self.batch_interval.as_secs(),
            "batch processor started"
        );

        while self.running.load(Ordering::Relaxed) {
            if self.pending_count() >= self.batch_size {
                if let Err(e) = self.flush().await {
                    error!(error = %e, "batch flush failed");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            } else {
                tokio::time::sleep(self.batch_interval).await;
                if self.pending_count() > 0 {
                    if let Err(e) = self.flush().await {
                        error!(error = %e, "batch flush failed");
                    }
                }
            }
        }

        while self.pending_count() > 0 {
            if let Err(e) = self.flush().await {
                error!(error = %e, "final batch flush failed");
                break;
            }
        }
        info!("batch processor stopped");
    }

    /// Flush one batch: dequeue, encode, gzip, check size, record in the
    /// ledger, and send.
    pub async fn flush(&self) -> Result<(), MeshError> {
        let items: Vec<Value> = {
            let mut queue = self.queue.lock().expect("batch queue lock poisoned");
            let take = self.batch_size.min(queue.len());
            queue.drain(..take).collect()
        };
        if items.is_empty() {
            return Ok(());
        }

        let body = json!({ "discoveries": self.encoder.encode(&items) });
        let compressed = gzip_json(&body);
        let payload_size = compressed.len();

        let batch_id = self
            .ledger
            .create_batch(items.len(), payload_size, self.client.destination_url())
            .await?;
        info!(
            batch_id = %batch_id,
            item_count = items.len(),
            payload_size,
            "processing batch"
        );

        if payload_size > self.limits.max_bytes {
            let message = format!(
                "Batch rejected: compressed payload {payload_size} bytes exceeds limit {}",
                self.limits.max_bytes
            );
            error!(batch_id = %batch_id, payload_size, "{message}");
            self.ledger
                .mark_failure(batch_id, None, &message, 0)
                .await?;
            self.batches_failed.fetch_add(1, Ordering::Relaxed);
            self.requeue_front(items);
            return Ok(());
        }
        if payload_size > self.limits.warn_bytes {
            warn!(batch_id = %batch_id, payload_size, "batch exceeds warn threshold");
        }

        self.ledger.mark_sending(batch_id).await?;

        match self.client.send_batch(compressed, items.len()).await {
            Ok(SendOutcome::Success(status)) => {
                self.ledger.mark_success(batch_id, status).await?;
                self.batches_sent.fetch_add(1, Ordering::Relaxed);
                info!(batch_id = %batch_id, status, "batch sent");
            }
            Ok(SendOutcome::ClientError(status, detail)) => {
                // Client errors are not recoverable by retry: drop items.
                self.ledger
                    .mark_failure(batch_id, Some(status), &detail, 0)
                    .await?;
                self.batches_failed.fetch_add(1, Ordering::Relaxed);
                error!(batch_id = %batch_id, status, "batch rejected by destination");
            }
            Err(e) => {
                self.ledger
                    .mark_failure(batch_id, None, &e.to_string(), self.client.max_attempts())
                    .await?;
                self.batches_failed.fetch_add(1, Ordering::Relaxed);
                error!(batch_id = %batch_id, error = %e, "batch failed after retries");
                // The destination could not accept: put everything back.
                self.requeue_front(items);
            }
        }
        Ok(())
    }

    /// Restore items at the head of the FIFO in their original order.
    fn requeue_front(&self, items: Vec<Value>) {
        let mut queue = self.queue.lock().expect("batch queue lock poisoned");
        for item in items.into_iter().rev() {
            queue.push_front(item);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitBreaker;
    use crate::client::RetryPolicy;
    use crate::encode::OutputFormat;
    use crate::ledger::LedgerStats;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Clone, PartialEq)]
    enum LedgerEvent {
        Created { item_count: usize },
        Sending,
        Success(u16),
        Failed { error: String },
    }

    #[derive(Default)]
    struct FakeLedger {
        events: StdMutex<Vec<LedgerEvent>>,
    }

    #[async_trait]
    impl BatchLedger for FakeLedger {
        async fn create_batch(
            &self,
            item_count: usize,
            _payload_size: usize,
            _destination_url: &str,
        ) -> Result<Uuid, MeshError> {
            self.events
                .lock()
                .unwrap()
                .push(LedgerEvent::Created { item_count });
            Ok(Uuid::new_v4())
        }

        async fn mark_sending(&self, _batch_id: Uuid) -> Result<(), MeshError> {
            self.events.lock().unwrap().push(LedgerEvent::Sending);
            Ok(())
        }

        async fn mark_success(&self, _batch_id: Uuid, status: u16) -> Result<(), MeshError> {
            self.events.lock().unwrap().push(LedgerEvent::Success(status));
            Ok(())
        }

        async fn mark_failure(
            &self,
            _batch_id: Uuid,
            _http_status: Option<u16>,
            error_message: &str,
            _retry_count: u32,
        ) -> Result<(), MeshError> {
            self.events.lock().unwrap().push(LedgerEvent::Failed {
                error: error_message.to_string(),
            });
            Ok(())
        }

        async fn stats(&self) -> Result<LedgerStats, MeshError> {
            Ok(LedgerStats::default())
        }

        async fn is_healthy(&self) -> bool {
            true
        }
    }

    fn processor(server: &MockServer, limits: SizeLimits) -> (BatchProcessor, &'static FakeLedger) {
        let ledger: &'static FakeLedger = Box::leak(Box::new(FakeLedger::default()));
        let client = EgressClient::new(
            format!("{}/v1/discovery", server.uri()),
            None,
            RetryPolicy {
                max_attempts: 2,
                backoff_multiplier: 0,
                max_delay: Duration::from_millis(1),
            },
            CircuitBreaker::new(5, Duration::from_secs(60)),
        );
        let p = BatchProcessor::new(
            3,
            Duration::from_millis(10),
            limits,
            BatchEncoder::new(OutputFormat::Raw, 50),
            client,
            Box::new(LedgerRef(ledger)),
        );
        (p, ledger)
    }

    struct LedgerRef(&'static FakeLedger);

    #[async_trait]
    impl BatchLedger for LedgerRef {
        async fn create_batch(
            &self,
            item_count: usize,
            payload_size: usize,
            destination_url: &str,
        ) -> Result<Uuid, MeshError> {
            self.0.create_batch(item_count, payload_size, destination_url).await
        }
        async fn mark_sending(&self, batch_id: Uuid) -> Result<(), MeshError> {
            self.0.mark_sending(batch_id).await
        }
        async fn mark_success(&self, batch_id: Uuid, status: u16) -> Result<(), MeshError> {
            self.0.mark_success(batch_id, status).await
        }
        async fn mark_failure(
            &self,
            batch_id: Uuid,
            http_status: Option<u16>,
            error_message: &str,
            retry_count: u32,
        ) -> Result<(), MeshError> {
            self.0
                .mark_failure(batch_id, http_status, error_message, retry_count)
                .await
        }
        async fn stats(&self) -> Result<LedgerStats, MeshError> {
            self.0.stats().await
        }
        async fn is_healthy(&self) -> bool {
            self.0.is_healthy().await
        }
    }

    #[tokio::test]
    async fn successful_flush_walks_the_ledger() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (p, ledger) = processor(&server, SizeLimits::default());
        p.add_item(json!({"n": 1}));
        p.add_item(json!({"n": 2}));
        p.flush().await.unwrap();

        let events = ledger.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                LedgerEvent::Created { item_count: 2 },
                LedgerEvent::Sending,
                LedgerEvent::Success(200),
            ]
        );
        assert_eq!(p.batches_sent(), 1);
        assert_eq!(p.pending_count(), 0);
    }

    #[tokio::test]
    async fn oversized_batch_rejected_and_requeued_in_order() {
        // S4: compressed payload over the hard limit never transmits;
        // items return to the head of the FIFO in original order.
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let limits = SizeLimits {
            max_bytes: 16,
            warn_bytes: 8,
        };
        let (p, ledger) = processor(&server, limits);
        p.add_item(json!({"n": 1}));
        p.add_item(json!({"n": 2}));
        p.add_item(json!({"n": 3}));
        p.flush().await.unwrap();

        let events = ledger.events.lock().unwrap().clone();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LedgerEvent::Created { item_count: 3 }));
        assert!(
            matches!(&events[1], LedgerEvent::Failed { error } if error.starts_with("Batch rejected"))
        );
        assert_eq!(p.batches_failed(), 1);
        assert_eq!(p.pending_count(), 3);
        // Original order preserved.
        let queue = p.queue.lock().unwrap();
        assert_eq!(queue[0], json!({"n": 1}));
        assert_eq!(queue[2], json!({"n": 3}));
    }

    #[tokio::test]
    async fn client_error_drops_items() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("schema mismatch"))
            .expect(1)
            .mount(&server)
            .await;

        let (p, ledger) = processor(&server, SizeLimits::default());
        p.add_item(json!({"n": 1}));
        p.flush().await.unwrap();

        let events = ledger.events.lock().unwrap().clone();
        assert!(
            matches!(&events[2], LedgerEvent::Failed { error } if error == "schema mismatch")
        );
        assert_eq!(p.batches_failed(), 1);
        // 4xx items are not recoverable by retry.
        assert_eq!(p.pending_count(), 0);
    }

    #[tokio::test]
    async fn server_error_requeues_items() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let (p, _ledger) = processor(&server, SizeLimits::default());
        p.add_item(json!({"n": 1}));
        p.add_item(json!({"n": 2}));
        p.flush().await.unwrap();

        assert_eq!(p.batches_failed(), 1);
        assert_eq!(p.pending_count(), 2);
        let queue = p.queue.lock().unwrap();
        assert_eq!(queue[0], json!({"n": 1}));
    }

    #[tokio::test]
    async fn flush_takes_at_most_batch_size() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (p, _ledger) = processor(&server, SizeLimits::default());
        for i in 0..5 {
            p.add_item(json!({"n": i}));
        }
        p.flush().await.unwrap();
        // batch_size is 3, so two items remain.
        assert_eq!(p.pending_count(), 2);
    }

    #[tokio::test]
    async fn empty_flush_is_a_no_op() {
        let server = MockServer::start().await;
        let (p, ledger) = processor(&server, SizeLimits::default());
        p.flush().await.unwrap();
        assert!(ledger.events.lock().unwrap().is_empty());
    }
}
