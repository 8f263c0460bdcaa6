// SPDX-License-Identifier: MIT OR Apache-2.0
//! Codebase metrics: file, line, and size tallies.

use serde::{Deserialize, Serialize};
use std::path::Path;
use walkdir::WalkDir;

/// Repository size metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodebaseMetrics {
    /// Files counted (after exclusions and the size cap).
    pub total_files: u64,
    /// Lines across counted files.
    pub total_lines: u64,
    /// Bytes across counted files.
    pub total_bytes: u64,
    /// Directories under the root (after exclusions).
    pub total_directories: u64,
    /// Files skipped for exceeding the size cap.
    pub skipped_large_files: u64,
    /// Largest counted file in bytes.
    pub largest_file_bytes: u64,
}

/// Computes [`CodebaseMetrics`] for a repository root.
pub struct MetricsCalculator {
    excluded_dirs: Vec<String>,
    max_file_size: u64,
}

impl MetricsCalculator {
    /// Calculator skipping the given directory names and files larger
    /// than `max_file_size_kb`.
    pub fn new(excluded_dirs: Vec<String>, max_file_size_kb: u64) -> Self {
        Self {
            excluded_dirs,
            max_file_size: max_file_size_kb * 1024,
        }
    }

    /// Walk the repository and tally.
    pub fn calculate(&self, repo_path: &Path) -> CodebaseMetrics {
        let mut metrics = CodebaseMetrics::default();

        let walker = WalkDir::new(repo_path).into_iter().filter_entry(|entry| {
            entry.depth() == 0
                || entry
                    .file_name()
                    .to_str()
                    .map(|name| !self.excluded_dirs.iter().any(|d| d == name))
                    .unwrap_or(true)
        });
        for entry in walker.filter_map(Result::ok) {
            if entry.file_type().is_dir() {
                if entry.depth() > 0 {
                    metrics.total_directories += 1;
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if size > self.max_file_size {
                metrics.skipped_large_files += 1;
                continue;
            }
            let lines = std::fs::read(entry.path())
                .map(|content| content.iter().filter(|&&b| b == b'\n').count() as u64)
                .unwrap_or(0);
            metrics.total_files += 1;
            metrics.total_lines += lines;
            metrics.total_bytes += size;
            metrics.largest_file_bytes = metrics.largest_file_bytes.max(size);
        }
        metrics
    }
}
