// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTPS egress client with gzip, retries, and the circuit breaker.

use crate::breaker::CircuitBreaker;
use dm_error::{ErrorCode, MeshError};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::Value;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, error, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry policy for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts (including the first).
    pub max_attempts: u32,
    /// Backoff multiplier in seconds.
    pub backoff_multiplier: u64,
    /// Backoff cap.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_multiplier: 2,
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying `attempt` (1-indexed):
    /// `multiplier × 2^(attempt-1)`, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = self
            .backoff_multiplier
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        Duration::from_secs(secs).min(self.max_delay)
    }
}

/// Terminal outcome of a batch send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// 2xx from the destination.
    Success(u16),
    /// 4xx from the destination: the batch is not recoverable by retry.
    ClientError(u16, String),
}

/// Gzip-compress a JSON document.
pub fn gzip_json(doc: &Value) -> Vec<u8> {
    let raw = serde_json::to_vec(doc).expect("batch document is always serialisable");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&raw)
        .and_then(|_| encoder.finish())
        .expect("in-memory gzip cannot fail")
}

/// HTTPS client for the external destination.
///
/// The circuit breaker is a field of this instance: two clients never
/// share breaker state.
pub struct EgressClient {
    destination_url: String,
    auth_token: Option<String>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    http: reqwest::Client,
}

impl EgressClient {
    /// Build a client for one destination.
    pub fn new(
        destination_url: impl Into<String>,
        auth_token: Option<String>,
        retry: RetryPolicy,
        breaker: CircuitBreaker,
    ) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(TOTAL_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            destination_url: destination_url.into(),
            auth_token,
            retry,
            breaker,
            http,
        }
    }

    /// The configured destination.
    pub fn destination_url(&self) -> &str {
        &self.destination_url
    }

    /// Whether the breaker is open (surfaced on `/ready`).
    pub fn is_circuit_open(&self) -> bool {
        self.breaker.is_open()
    }

    /// Retry attempts used when recording ledger failures.
    pub fn max_attempts(&self) -> u32 {
        self.retry.max_attempts
    }

    /// Send one gzipped batch body.
    ///
    /// Transient failures (5xx, network errors) retry with exponential
    /// backoff; after exhaustion the breaker records a failure and the
    /// error propagates. 4xx responses return [`SendOutcome::ClientError`]
    /// without retrying.
    pub async fn send_batch(&self, body: Vec<u8>, item_count: usize) -> Result<SendOutcome, MeshError> {
        self.breaker.try_acquire()?;

        let mut attempt = 1u32;
        loop {
            match self.send_once(&body, item_count).await {
                Ok(outcome) => {
                    self.breaker.record_success();
                    return Ok(outcome);
                }
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    debug!(
                        attempt,
                        delay_s = delay.as_secs(),
                        error = %err,
                        "transient egress failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(attempt, error = %err, "egress failed");
                    self.breaker.record_failure();
                    return Err(err);
                }
            }
        }
    }

    async fn send_once(&self, body: &[u8], item_count: usize) -> Result<SendOutcome, MeshError> {
        let mut req = self
            .http
            .post(&self.destination_url)
            .header("Content-Type", "application/json")
            .header("Content-Encoding", "gzip")
            .body(body.to_vec());
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        let resp = req.send().await.map_err(|e| {
            MeshError::new(ErrorCode::TransportTimeout, e.to_string())
                .with_context("destination", self.destination_url.clone())
        })?;

        let status = resp.status().as_u16();
        info!(status, item_count, "transmission response");

        if (500..600).contains(&status) {
            return Err(
                MeshError::new(ErrorCode::UpstreamUnavailable, format!("server error: {status}"))
                    .with_context("http_status", status.to_string()),
            );
        }
        if (400..500).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            return Ok(SendOutcome::ClientError(status, text));
        }
        Ok(SendOutcome::Success(status))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use serde_json::json;
    use std::io::Read;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_multiplier: 0,
            max_delay: Duration::from_millis(1),
        }
    }

    fn client(server: &MockServer, token: Option<&str>, threshold: u32) -> EgressClient {
        EgressClient::new(
            format!("{}/v1/discovery", server.uri()),
            token.map(str::to_string),
            fast_retry(),
            CircuitBreaker::new(threshold, Duration::from_secs(60)),
        )
    }

    #[test]
    fn gzip_round_trips() {
        let doc = json!({"discoveries": [1, 2, 3]});
        let compressed = gzip_json(&doc);
        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut raw = String::new();
        decoder.read_to_string(&mut raw).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&raw).unwrap(), doc);
    }

    #[test]
    fn backoff_schedule() {
        let retry = RetryPolicy {
            max_attempts: 4,
            backoff_multiplier: 2,
            max_delay: Duration::from_secs(300),
        };
        assert_eq!(retry.delay(1), Duration::from_secs(2));
        assert_eq!(retry.delay(2), Duration::from_secs(4));
        assert_eq!(retry.delay(3), Duration::from_secs(8));

        let capped = RetryPolicy {
            max_attempts: 10,
            backoff_multiplier: 2,
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(capped.delay(5), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn success_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/discovery"))
            .and(header("Content-Encoding", "gzip"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, Some("tok"), 5);
        let outcome = client
            .send_batch(gzip_json(&json!({"discoveries": []})), 0)
            .await
            .unwrap();
        assert_eq!(outcome, SendOutcome::Success(202));
    }

    #[tokio::test]
    async fn client_error_does_not_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad payload"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, None, 5);
        let outcome = client
            .send_batch(gzip_json(&json!({})), 1)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SendOutcome::ClientError(422, "bad payload".to_string())
        );
    }

    #[tokio::test]
    async fn server_error_retries_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = client(&server, None, 5);
        let err = client.send_batch(gzip_json(&json!({})), 1).await.unwrap_err();
        assert!(err.is_transient() || err.code == ErrorCode::UpstreamUnavailable);
    }

    #[tokio::test]
    async fn breaker_opens_and_sheds_load() {
        // Property 7: after threshold consecutive transient failures the
        // next call returns without issuing a request.
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(6)
            .mount(&server)
            .await;

        // Each send_batch exhausts 3 attempts and records one breaker
        // failure; threshold 2 opens after the second send.
        let client = client(&server, None, 2);
        assert!(client.send_batch(gzip_json(&json!({})), 1).await.is_err());
        assert!(client.send_batch(gzip_json(&json!({})), 1).await.is_err());
        assert!(client.is_circuit_open());

        let err = client.send_batch(gzip_json(&json!({})), 1).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::CircuitOpen);
        // The mock's expect(6) verifies no further request was made.
    }

    #[tokio::test]
    async fn half_open_probe_closes_breaker() {
        let server = MockServer::start().await;
        // First two calls fail, then the destination recovers.
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = EgressClient::new(
            format!("{}/v1/discovery", server.uri()),
            None,
            RetryPolicy {
                max_attempts: 3,
                backoff_multiplier: 0,
                max_delay: Duration::from_millis(1),
            },
            CircuitBreaker::new(1, Duration::from_millis(20)),
        );

        assert!(client.send_batch(gzip_json(&json!({})), 1).await.is_err());
        assert!(client.is_circuit_open());

        tokio::time::sleep(Duration::from_millis(30)).await;
        let outcome = client.send_batch(gzip_json(&json!({})), 1).await.unwrap();
        assert_eq!(outcome, SendOutcome::Success(200));
        assert!(!client.is_circuit_open());
    }
}
