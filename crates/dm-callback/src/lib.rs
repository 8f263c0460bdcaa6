// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scan callback client.
//!
//! Collectors report progress and completion to the approval API while an
//! autonomous scan runs. Callback transport failures are logged and
//! swallowed: a scan must never abort because the approval API was
//! momentarily unreachable.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const API_KEY_HEADER: &str = "X-Internal-API-Key";

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Terminal status of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Every target was analysed and published.
    Completed,
    /// Some targets failed while others produced events.
    Partial,
    /// Every target failed.
    Failed,
    /// The scan exceeded its deadline.
    Timeout,
}

/// Progress callback body (§ callback protocol).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressPayload {
    /// Scan this report belongs to.
    pub scan_id: String,
    /// Reporting collector name.
    pub collector: String,
    /// Monotonically increasing report number.
    pub sequence: u64,
    /// Current phase (`initializing`, `scanning`, ...).
    pub phase: String,
    /// Progress percentage, 0–100.
    pub progress: u8,
    /// Events published so far.
    pub discovery_count: u64,
    /// Optional status message.
    pub message: Option<String>,
    /// RFC-3339 report time.
    pub timestamp: String,
}

/// Completion callback body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionPayload {
    /// Scan this report belongs to.
    pub scan_id: String,
    /// Reporting collector name.
    pub collector: String,
    /// Terminal status.
    pub status: ScanStatus,
    /// Total events published under the scan.
    pub discovery_count: u64,
    /// Failure summary when the scan was not fully successful.
    pub error_message: Option<String>,
    /// RFC-3339 report time.
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// CallbackReporter
// ---------------------------------------------------------------------------

/// Reports progress and completion for one scan.
///
/// Thread-safe: the sequence and discovery counters are atomics, so the
/// reporter can be shared across per-target tasks.
pub struct CallbackReporter {
    scan_id: String,
    collector: String,
    progress_url: String,
    complete_url: String,
    api_key: Option<String>,
    sequence: AtomicU64,
    discovery_count: AtomicU64,
    client: reqwest::Client,
}

impl CallbackReporter {
    /// Create a reporter for one scan. `api_key` is the
    /// `X-Internal-API-Key` forwarded from the originating scan request.
    pub fn new(
        scan_id: impl Into<String>,
        collector: impl Into<String>,
        progress_url: impl Into<String>,
        complete_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            scan_id: scan_id.into(),
            collector: collector.into(),
            progress_url: progress_url.into(),
            complete_url: complete_url.into(),
            api_key,
            sequence: AtomicU64::new(0),
            discovery_count: AtomicU64::new(0),
            client,
        }
    }

    /// Events published so far.
    pub fn discovery_count(&self) -> u64 {
        self.discovery_count.load(Ordering::Relaxed)
    }

    /// Bump the discovery counter surfaced on subsequent reports.
    pub fn increment_discovery_count(&self, n: u64) {
        self.discovery_count.fetch_add(n, Ordering::Relaxed);
    }

    /// POST a progress report. Returns whether the callback was accepted;
    /// transport failures are logged and reported as `false`.
    pub async fn report_progress(&self, phase: &str, progress: u8, message: Option<&str>) -> bool {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let payload = ProgressPayload {
            scan_id: self.scan_id.clone(),
            collector: self.collector.clone(),
            sequence,
            phase: phase.to_string(),
            progress: progress.min(100),
            discovery_count: self.discovery_count(),
            message: message.map(str::to_string),
            timestamp: now(),
        };
        self.post(&self.progress_url, &payload, "progress").await
    }

    /// POST the final completion report.
    pub async fn report_complete(&self, status: ScanStatus, error_message: Option<&str>) -> bool {
        let payload = CompletionPayload {
            scan_id: self.scan_id.clone(),
            collector: self.collector.clone(),
            status,
            discovery_count: self.discovery_count(),
            error_message: error_message.map(str::to_string),
            timestamp: now(),
        };
        self.post(&self.complete_url, &payload, "complete").await
    }

    async fn post<T: Serialize>(&self, url: &str, payload: &T, kind: &str) -> bool {
        let mut req = self.client.post(url).json(payload);
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }
        match req.send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(
                    scan_id = %self.scan_id,
                    callback = kind,
                    status = resp.status().as_u16(),
                    "callback rejected"
                );
                false
            }
            Err(e) => {
                warn!(scan_id = %self.scan_id, callback = kind, error = %e, "callback failed");
                false
            }
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reporter(server: &MockServer, api_key: Option<&str>) -> CallbackReporter {
        CallbackReporter::new(
            "scan-1",
            "code-analyzer",
            format!("{}/progress", server.uri()),
            format!("{}/complete", server.uri()),
            api_key.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn progress_posts_sequence_and_counts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/progress"))
            .and(body_partial_json(serde_json::json!({
                "scan_id": "scan-1",
                "collector": "code-analyzer",
                "sequence": 1,
                "phase": "initializing",
                "progress": 0,
                "discovery_count": 0,
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let r = reporter(&server, None);
        assert!(r.report_progress("initializing", 0, Some("starting")).await);
    }

    #[tokio::test]
    async fn sequence_is_monotonic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/progress"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let r = reporter(&server, None);
        r.report_progress("scanning", 10, None).await;
        r.report_progress("scanning", 20, None).await;
        let ok = r.report_progress("scanning", 30, None).await;
        assert!(ok);
        assert_eq!(r.sequence.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn api_key_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/complete"))
            .and(header("X-Internal-API-Key", "sekrit"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let r = reporter(&server, Some("sekrit"));
        assert!(r.report_complete(ScanStatus::Completed, None).await);
    }

    #[tokio::test]
    async fn discovery_count_flows_into_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/complete"))
            .and(body_partial_json(serde_json::json!({
                "status": "partial",
                "discovery_count": 7,
                "error_message": "1/5 repos failed analysis",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let r = reporter(&server, None);
        r.increment_discovery_count(7);
        assert!(
            r.report_complete(ScanStatus::Partial, Some("1/5 repos failed analysis"))
                .await
        );
    }

    #[tokio::test]
    async fn rejected_callback_returns_false_without_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/progress"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let r = reporter(&server, None);
        assert!(!r.report_progress("scanning", 50, None).await);
    }

    #[tokio::test]
    async fn unreachable_server_is_swallowed() {
        let r = CallbackReporter::new(
            "scan-1",
            "code-analyzer",
            "http://127.0.0.1:1/progress",
            "http://127.0.0.1:1/complete",
            None,
        );
        assert!(!r.report_progress("scanning", 1, None).await);
        assert!(!r.report_complete(ScanStatus::Failed, Some("boom")).await);
    }

    #[test]
    fn progress_is_clamped() {
        // The payload clamps to 100 before serialisation.
        let payload = ProgressPayload {
            scan_id: "s".into(),
            collector: "c".into(),
            sequence: 1,
            phase: "scanning".into(),
            progress: 100,
            discovery_count: 0,
            message: None,
            timestamp: now(),
        };
        assert_eq!(payload.progress, 100);
    }

    #[test]
    fn status_serialises_snake_case() {
        assert_eq!(
            serde_json::to_string(&ScanStatus::Partial).unwrap(),
            "\"partial\""
        );
        assert_eq!(
            serde_json::to_string(&ScanStatus::Timeout).unwrap(),
            "\"timeout\""
        );
    }
}
