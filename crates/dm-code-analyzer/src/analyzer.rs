// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-repository analyzer behind `/analyze`, `/discover`, and the
//! dry-run trigger.

use crate::analyzers::dependencies::{self, Dependency};
use crate::analyzers::frameworks::{self, Framework};
use crate::analyzers::language::{LanguageDetector, LanguageReport};
use crate::analyzers::metrics::{CodebaseMetrics, MetricsCalculator};
use async_trait::async_trait;
use chrono::Utc;
use dm_core::{DiscoveredRecord, EntityKind, EolTable};
use dm_error::MeshError;
use dm_scan::TargetAnalyzer;
use serde_json::json;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Full analysis of one repository.
#[derive(Debug, Clone)]
pub struct RepoAnalysis {
    /// Analysis identifier shared across the repository's records.
    pub analysis_id: String,
    /// `file://` URL of the repository.
    pub repository_url: String,
    /// Language report.
    pub languages: LanguageReport,
    /// Detected frameworks.
    pub frameworks: Vec<Framework>,
    /// Extracted dependencies.
    pub dependencies: Vec<Dependency>,
    /// Codebase metrics.
    pub metrics: CodebaseMetrics,
    /// Runtime end-of-life findings.
    pub eol_findings: Vec<serde_json::Value>,
}

/// Analyzes repository directories into publishable records.
pub struct RepoAnalyzer {
    language_detector: LanguageDetector,
    metrics_calculator: MetricsCalculator,
    eol_table: Option<EolTable>,
}

impl RepoAnalyzer {
    /// Assemble an analyzer. `eol_table` is optional; without it the EOL
    /// findings list stays empty.
    pub fn new(
        excluded_dirs: Vec<String>,
        max_file_size_kb: u64,
        eol_table: Option<EolTable>,
    ) -> Self {
        Self {
            language_detector: LanguageDetector::new(excluded_dirs.clone()),
            metrics_calculator: MetricsCalculator::new(excluded_dirs, max_file_size_kb),
            eol_table,
        }
    }

    /// Run the full analysis over one repository directory.
    pub fn analyze_repo(&self, repo_path: &Path) -> Result<RepoAnalysis, MeshError> {
        if !repo_path.is_dir() {
            return Err(MeshError::validation(format!(
                "not a directory: {}",
                repo_path.display()
            )));
        }

        let languages = self.language_detector.detect(repo_path);
        let dependencies = dependencies::extract(repo_path);
        let frameworks = frameworks::detect(repo_path, &dependencies);
        let metrics = self.metrics_calculator.calculate(repo_path);
        let eol_findings = self.check_eol(repo_path);

        Ok(RepoAnalysis {
            analysis_id: Uuid::new_v4().to_string(),
            repository_url: format!("file://{}", repo_path.display()),
            languages,
            frameworks,
            dependencies,
            metrics,
            eol_findings,
        })
    }

    fn check_eol(&self, repo_path: &Path) -> Vec<serde_json::Value> {
        let Some(table) = &self.eol_table else {
            return Vec::new();
        };
        let today = Utc::now().date_naive();

        runtime_pins(repo_path)
            .into_iter()
            .filter_map(|(product, version)| {
                let status = table.check_runtime(&product, &version, today);
                if status.support_status == dm_core::SupportStatus::Unknown {
                    return None;
                }
                Some(json!({
                    "product": product,
                    "pinned_version": version,
                    "status": status,
                }))
            })
            .collect()
    }

    /// Build the publishable records for one analysed repository:
    /// one `repository`, one `codebase`, and one `dependency` per
    /// extracted dependency.
    pub fn records_for(&self, analysis: &RepoAnalysis) -> Vec<DiscoveredRecord> {
        let discovered_at = Utc::now().to_rfc3339();
        let mut records = vec![
            DiscoveredRecord::new(
                EntityKind::Repository,
                json!({
                    "analysis_id": analysis.analysis_id,
                    "repository_url": analysis.repository_url,
                    "branch": "local",
                    "languages": analysis.languages.languages,
                    "frameworks": analysis.frameworks,
                    "discovered_at": discovered_at,
                }),
            ),
            DiscoveredRecord::new(
                EntityKind::Codebase,
                json!({
                    "analysis_id": analysis.analysis_id,
                    "repository_url": analysis.repository_url,
                    "metrics": analysis.metrics,
                    "eol_findings": analysis.eol_findings,
                    "discovered_at": discovered_at,
                }),
            ),
        ];
        for dependency in &analysis.dependencies {
            records.push(DiscoveredRecord::new(
                EntityKind::Dependency,
                json!({
                    "analysis_id": analysis.analysis_id,
                    "repository_url": analysis.repository_url,
                    "dependency": dependency,
                    "discovered_at": discovered_at,
                }),
            ));
        }
        records
    }
}

#[async_trait]
impl TargetAnalyzer for RepoAnalyzer {
    type Target = PathBuf;

    fn label(&self, target: &PathBuf) -> String {
        target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("repository")
            .to_string()
    }

    async fn analyze(&self, target: &PathBuf) -> Result<Vec<DiscoveredRecord>, MeshError> {
        let analysis = self.analyze_repo(target)?;
        Ok(self.records_for(&analysis))
    }
}

/// Runtime version pins declared in a repository's manifests:
/// `package.json` `engines.node`, the `go.mod` `go` directive,
/// `.python-version`, `.ruby-version`, and `pyproject.toml`
/// `requires-python`.
pub fn runtime_pins(repo_path: &Path) -> Vec<(String, String)> {
    let mut pins = Vec::new();

    if let Ok(raw) = std::fs::read_to_string(repo_path.join("package.json")) {
        if let Ok(doc) = serde_json::from_str::<serde_json::Value>(&raw) {
            if let Some(node) = doc
                .get("engines")
                .and_then(|e| e.get("node"))
                .and_then(serde_json::Value::as_str)
            {
                pins.push(("node".to_string(), node.to_string()));
            }
        }
    }
    if let Ok(raw) = std::fs::read_to_string(repo_path.join("go.mod")) {
        for line in raw.lines().map(str::trim) {
            if let Some(version) = line.strip_prefix("go ") {
                pins.push(("go".to_string(), version.trim().to_string()));
                break;
            }
        }
    }
    if let Ok(raw) = std::fs::read_to_string(repo_path.join(".python-version")) {
        let version = raw.trim();
        if !version.is_empty() {
            pins.push(("python".to_string(), version.to_string()));
        }
    }
    if let Ok(raw) = std::fs::read_to_string(repo_path.join(".ruby-version")) {
        let version = raw.trim();
        if !version.is_empty() {
            pins.push(("ruby".to_string(), version.to_string()));
        }
    }
    if let Ok(raw) = std::fs::read_to_string(repo_path.join("pyproject.toml")) {
        for line in raw.lines().map(str::trim) {
            if let Some(rest) = line.strip_prefix("requires-python") {
                let version = rest.trim_start_matches(['=', ' ']).trim_matches('"');
                if !version.is_empty() {
                    pins.push(("python".to_string(), version.to_string()));
                }
                break;
            }
        }
    }
    pins
}

/// Enumerate repository directories under the scan paths, capped.
pub fn enumerate_repos(scan_paths: &[String], max_repos: usize) -> Vec<PathBuf> {
    let mut repos = Vec::new();
    for scan_path in scan_paths {
        let Ok(entries) = std::fs::read_dir(scan_path) else {
            tracing::warn!(path = %scan_path, "scan path not found");
            continue;
        };
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| !n.starts_with('.'))
                    .unwrap_or(false)
            })
            .collect();
        dirs.sort();
        for dir in dirs {
            repos.push(dir);
            if repos.len() >= max_repos {
                return repos;
            }
        }
    }
    repos
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
