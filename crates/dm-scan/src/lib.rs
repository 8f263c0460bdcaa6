// SPDX-License-Identifier: MIT OR Apache-2.0
//! Autonomous scan lifecycle shared by all collectors.
//!
//! Every collector implements the same scan protocol: enumerate targets
//! under the configured paths, analyse each one, publish the resulting
//! records, report progress along the way, and finish with exactly one
//! completion callback. A single target failure never aborts the scan;
//! the engine carries on and reports `partial` at the end.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use dm_callback::{CallbackReporter, ScanStatus};
use dm_core::DiscoveredRecord;
use dm_error::MeshError;
use dm_events::{CloudEvent, EventPublisher, discovered_key, discovered_type};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ---------------------------------------------------------------------------
// Request model
// ---------------------------------------------------------------------------

/// Safety limits carried on a scan request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLimits {
    /// Maximum number of targets to enumerate.
    #[serde(default = "default_max_targets")]
    pub max_targets: usize,
    /// Maximum directory depth for path-based collectors.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_targets() -> usize {
    100
}

fn default_max_depth() -> usize {
    5
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_targets: default_max_targets(),
            max_depth: default_max_depth(),
        }
    }
}

/// An autonomous scan request, shared by all collectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Opaque scan identifier that flows into every published event.
    pub scan_id: String,
    /// Filesystem paths to enumerate (path-based collectors).
    #[serde(default)]
    pub scan_paths: Vec<String>,
    /// Explicit endpoints to probe (network-based collectors).
    #[serde(default)]
    pub targets: Vec<String>,
    /// Safety limits.
    #[serde(default)]
    pub limits: ScanLimits,
    /// Progress callback URL.
    pub progress_url: String,
    /// Completion callback URL.
    pub complete_url: String,
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Per-collector analysis of a single target.
#[async_trait]
pub trait TargetAnalyzer: Send + Sync {
    /// The collector's target type (a repository path, an endpoint, ...).
    type Target: Send + Sync;

    /// Short human-readable name used in progress messages.
    fn label(&self, target: &Self::Target) -> String;

    /// Analyse one target into zero or more publishable records.
    async fn analyze(&self, target: &Self::Target) -> Result<Vec<DiscoveredRecord>, MeshError>;
}

/// Destination for records produced during a scan.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Publish one record under the given scan.
    async fn publish(&self, record: &DiscoveredRecord, scan_id: &str) -> Result<(), MeshError>;
}

/// The production sink: wraps records in CloudEvents and publishes them on
/// the discovery exchange with the collector's source path.
pub struct EventSink {
    publisher: EventPublisher,
    source: String,
}

impl EventSink {
    /// `collector` is the short name used in the source path
    /// (`/collectors/<collector>`).
    pub fn new(publisher: EventPublisher, collector: &str) -> Self {
        Self {
            publisher,
            source: format!("/collectors/{collector}"),
        }
    }
}

#[async_trait]
impl RecordSink for EventSink {
    async fn publish(&self, record: &DiscoveredRecord, scan_id: &str) -> Result<(), MeshError> {
        let event = CloudEvent::new(
            self.source.clone(),
            discovered_type(record.kind),
            record.data.clone(),
        )
        .with_subject(scan_id);
        self.publisher
            .publish(&discovered_key(record.kind), &event)
            .await
    }
}

// ---------------------------------------------------------------------------
// Scan outcome
// ---------------------------------------------------------------------------

/// Summary of a finished scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// Terminal status reported on the completion callback.
    pub status: ScanStatus,
    /// Targets fully analysed and published.
    pub analyzed: usize,
    /// Targets that failed.
    pub failed: usize,
    /// Targets enumerated.
    pub total: usize,
    /// Events published under the scan.
    pub discovery_count: u64,
    /// Failure summary, when not fully successful.
    pub error_message: Option<String>,
}

/// Derive the terminal status from failure counts.
///
/// `partial` iff some but not all targets failed; an empty scan completes.
pub fn completion_status(failed: usize, total: usize) -> ScanStatus {
    if failed == 0 {
        ScanStatus::Completed
    } else if failed == total {
        ScanStatus::Failed
    } else {
        ScanStatus::Partial
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Run the shared scan loop over enumerated targets.
///
/// `noun` names the target kind in failure summaries (`"repos"`,
/// `"targets"`, ...). A target counts as analysed only once every record it
/// produced has been published; the discovery counter is bumped per
/// published record.
pub async fn run_scan<A>(
    analyzer: &A,
    targets: &[A::Target],
    sink: &dyn RecordSink,
    reporter: &CallbackReporter,
    scan_id: &str,
    noun: &str,
) -> ScanOutcome
where
    A: TargetAnalyzer,
{
    reporter
        .report_progress("initializing", 0, Some(&format!("Starting {noun} discovery")))
        .await;

    let total = targets.len();
    let mut analyzed = 0usize;
    let mut failed = 0usize;

    for (i, target) in targets.iter().enumerate() {
        let label = analyzer.label(target);
        let progress = (((i + 1) * 100) / total.max(1)) as u8;
        reporter
            .report_progress(
                "scanning",
                progress,
                Some(&format!("Analyzing {} {}/{}: {label}", noun, i + 1, total)),
            )
            .await;

        match analyzer.analyze(target).await {
            Ok(records) => {
                let mut publish_failed = false;
                for record in &records {
                    match sink.publish(record, scan_id).await {
                        Ok(()) => reporter.increment_discovery_count(1),
                        Err(e) => {
                            error!(scan_id, target = %label, error = %e, "publish failed");
                            publish_failed = true;
                            break;
                        }
                    }
                }
                // Analysed only when every record for the target made it out.
                if publish_failed {
                    failed += 1;
                } else {
                    analyzed += 1;
                }
            }
            Err(e) => {
                error!(scan_id, target = %label, error = %e, "target analysis failed");
                failed += 1;
            }
        }
    }

    let status = completion_status(failed, total);
    let error_message = if failed > 0 {
        Some(format!("{failed}/{total} {noun} failed analysis"))
    } else {
        None
    };

    reporter
        .report_complete(status, error_message.as_deref())
        .await;

    let outcome = ScanOutcome {
        status,
        analyzed,
        failed,
        total,
        discovery_count: reporter.discovery_count(),
        error_message,
    };
    info!(
        scan_id,
        status = ?outcome.status,
        analyzed,
        failed,
        total,
        discoveries = outcome.discovery_count,
        "scan finished"
    );
    outcome
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use dm_core::EntityKind;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FakeAnalyzer {
        /// Targets whose analysis should fail.
        failing: Vec<String>,
        /// Records produced per successful target.
        per_target: usize,
    }

    #[async_trait]
    impl TargetAnalyzer for FakeAnalyzer {
        type Target = String;

        fn label(&self, target: &String) -> String {
            target.clone()
        }

        async fn analyze(&self, target: &String) -> Result<Vec<DiscoveredRecord>, MeshError> {
            if self.failing.contains(target) {
                return Err(MeshError::validation(format!("cannot analyse {target}")));
            }
            Ok((0..self.per_target)
                .map(|i| DiscoveredRecord::new(EntityKind::Repository, json!({"n": i})))
                .collect())
        }
    }

    #[derive(Default)]
    struct CapturingSink {
        published: Mutex<Vec<(String, serde_json::Value)>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl RecordSink for CapturingSink {
        async fn publish(&self, record: &DiscoveredRecord, scan_id: &str) -> Result<(), MeshError> {
            let mut published = self.published.lock().unwrap();
            if let Some(limit) = self.fail_after {
                if published.len() >= limit {
                    return Err(MeshError::new(
                        dm_error::ErrorCode::BrokerDisconnected,
                        "broker gone",
                    ));
                }
            }
            published.push((scan_id.to_string(), record.data.clone()));
            Ok(())
        }
    }

    async fn callback_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/progress"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/complete"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        server
    }

    fn reporter(server: &MockServer) -> CallbackReporter {
        CallbackReporter::new(
            "scan-9",
            "code-analyzer",
            format!("{}/progress", server.uri()),
            format!("{}/complete", server.uri()),
            None,
        )
    }

    #[tokio::test]
    async fn clean_scan_completes() {
        let server = callback_server().await;
        let analyzer = FakeAnalyzer {
            failing: vec![],
            per_target: 2,
        };
        let sink = CapturingSink::default();
        let targets: Vec<String> = vec!["a".into(), "b".into()];

        let outcome = run_scan(&analyzer, &targets, &sink, &reporter(&server), "scan-9", "repos").await;

        assert_eq!(outcome.status, ScanStatus::Completed);
        assert_eq!(outcome.analyzed, 2);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.discovery_count, 4);
        assert_eq!(outcome.error_message, None);
        assert_eq!(sink.published.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn one_failing_target_yields_partial() {
        // S6: 5 targets, target 3 raises; others still publish.
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/progress"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/complete"))
            .and(body_partial_json(json!({
                "status": "partial",
                "error_message": "1/5 repos failed analysis",
                "discovery_count": 4,
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let analyzer = FakeAnalyzer {
            failing: vec!["t3".into()],
            per_target: 1,
        };
        let sink = CapturingSink::default();
        let targets: Vec<String> = ["t1", "t2", "t3", "t4", "t5"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let outcome = run_scan(&analyzer, &targets, &sink, &reporter(&server), "scan-9", "repos").await;

        assert_eq!(outcome.status, ScanStatus::Partial);
        assert_eq!(outcome.analyzed, 4);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.discovery_count, 4);
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("1/5 repos failed analysis")
        );
    }

    #[tokio::test]
    async fn all_failing_targets_yield_failed() {
        let server = callback_server().await;
        let analyzer = FakeAnalyzer {
            failing: vec!["x".into(), "y".into()],
            per_target: 1,
        };
        let sink = CapturingSink::default();
        let targets: Vec<String> = vec!["x".into(), "y".into()];

        let outcome = run_scan(&analyzer, &targets, &sink, &reporter(&server), "scan-9", "targets").await;

        assert_eq!(outcome.status, ScanStatus::Failed);
        assert_eq!(outcome.analyzed, 0);
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("2/2 targets failed analysis")
        );
    }

    #[tokio::test]
    async fn empty_target_list_completes() {
        let server = callback_server().await;
        let analyzer = FakeAnalyzer {
            failing: vec![],
            per_target: 1,
        };
        let sink = CapturingSink::default();

        let outcome = run_scan(&analyzer, &[], &sink, &reporter(&server), "scan-9", "repos").await;

        assert_eq!(outcome.status, ScanStatus::Completed);
        assert_eq!(outcome.total, 0);
    }

    #[tokio::test]
    async fn publish_failure_marks_target_failed() {
        // Target counts as analysed only after all its publishes succeed.
        let server = callback_server().await;
        let analyzer = FakeAnalyzer {
            failing: vec![],
            per_target: 2,
        };
        let sink = CapturingSink {
            published: Mutex::new(Vec::new()),
            fail_after: Some(3),
        };
        let targets: Vec<String> = vec!["a".into(), "b".into()];

        let outcome = run_scan(&analyzer, &targets, &sink, &reporter(&server), "scan-9", "repos").await;

        // Target a publishes 2, target b publishes 1 then the broker dies.
        assert_eq!(outcome.analyzed, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.status, ScanStatus::Partial);
        assert_eq!(outcome.discovery_count, 3);
    }

    #[test]
    fn status_rule_matrix() {
        assert_eq!(completion_status(0, 5), ScanStatus::Completed);
        assert_eq!(completion_status(2, 5), ScanStatus::Partial);
        assert_eq!(completion_status(5, 5), ScanStatus::Failed);
        assert_eq!(completion_status(0, 0), ScanStatus::Completed);
    }

    #[test]
    fn limits_default() {
        let req: ScanRequest = serde_json::from_str(
            r#"{"scan_id": "s", "progress_url": "p", "complete_url": "c"}"#,
        )
        .unwrap();
        assert_eq!(req.limits.max_targets, 100);
        assert_eq!(req.limits.max_depth, 5);
        assert!(req.scan_paths.is_empty());
    }
}
