// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-of-life support table for runtimes.
//!
//! The table is loaded from a versioned JSON data file of the form
//! `{version, products: {<name>: {<version>: {eol, support_status}}}}` and
//! queried with a normalised version string. Lookup tries an exact match,
//! then `major.minor`, then major only.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Errors raised while loading the EOL data file.
#[derive(Debug, thiserror::Error)]
pub enum EolError {
    /// The data file could not be read.
    #[error("failed to read EOL data: {0}")]
    Io(#[from] std::io::Error),
    /// The data file is not valid JSON of the expected shape.
    #[error("failed to parse EOL data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Support lifecycle states carried by the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportStatus {
    /// Fully supported.
    Active,
    /// Bug fixes only.
    Maintenance,
    /// Security fixes only.
    SecurityOnly,
    /// Past end of life.
    Eol,
    /// Not present in the table.
    Unknown,
}

/// One `(product, version-key)` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EolRecord {
    /// End-of-life date, `YYYY-MM-DD`.
    pub eol: Option<String>,
    /// Support lifecycle state.
    pub support_status: SupportStatus,
}

/// Result of an EOL lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EolStatus {
    /// Whether the matched version is past its EOL date, when decidable.
    pub is_eol: Option<bool>,
    /// The EOL date from the table.
    pub eol_date: Option<String>,
    /// Support lifecycle state (`Unknown` when the version is absent).
    pub support_status: SupportStatus,
    /// The normalised version key that matched (or was looked up).
    pub checked_version: String,
}

#[derive(Debug, Clone, Deserialize)]
struct EolFile {
    #[serde(default)]
    version: String,
    #[serde(default)]
    products: BTreeMap<String, BTreeMap<String, EolRecord>>,
}

/// The loaded end-of-life table.
#[derive(Debug, Clone)]
pub struct EolTable {
    data_version: String,
    products: BTreeMap<String, BTreeMap<String, EolRecord>>,
}

impl EolTable {
    /// Load the table from a JSON data file.
    pub fn load(path: &Path) -> Result<Self, EolError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse the table from an in-memory JSON document.
    pub fn from_json(raw: &str) -> Result<Self, EolError> {
        let file: EolFile = serde_json::from_str(raw)?;
        Ok(Self {
            data_version: file.version,
            products: file.products,
        })
    }

    /// Version stamp of the loaded data file.
    pub fn data_version(&self) -> &str {
        &self.data_version
    }

    /// Look up a runtime version. `today` decides `is_eol` relative to the
    /// table's EOL date.
    pub fn check_runtime(&self, product: &str, version: &str, today: NaiveDate) -> EolStatus {
        let normalized = normalize_version(version);
        let product_data = match self.products.get(&product.to_lowercase()) {
            Some(p) => p,
            None => return EolStatus::unknown(normalized),
        };

        // Exact, then major.minor, then major only.
        if let Some(rec) = product_data.get(&normalized) {
            return format_status(rec, &normalized, today);
        }
        let parts: Vec<&str> = normalized.split('.').collect();
        if parts.len() >= 2 {
            let major_minor = format!("{}.{}", parts[0], parts[1]);
            if let Some(rec) = product_data.get(&major_minor) {
                return format_status(rec, &major_minor, today);
            }
        }
        if let Some(first) = parts.first() {
            if let Some(rec) = product_data.get(*first) {
                return format_status(rec, first, today);
            }
        }

        EolStatus::unknown(normalized)
    }
}

impl EolStatus {
    fn unknown(checked_version: String) -> Self {
        Self {
            is_eol: None,
            eol_date: None,
            support_status: SupportStatus::Unknown,
            checked_version,
        }
    }
}

fn format_status(rec: &EolRecord, matched: &str, today: NaiveDate) -> EolStatus {
    let is_eol = rec
        .eol
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .map(|d| d < today);
    EolStatus {
        is_eol,
        eol_date: rec.eol.clone(),
        support_status: rec.support_status,
        checked_version: matched.to_string(),
    }
}

/// Strip range operators and pre-release suffixes for table matching.
pub fn normalize_version(version: &str) -> String {
    let trimmed = version.trim_start_matches(['^', '~', '>', '=', '<', 'v']);
    let mut out = trimmed;
    for sep in ['-', '+', 'a', 'b'] {
        if let Some(idx) = out.find(sep) {
            out = &out[..idx];
        }
    }
    if let Some(idx) = out.find("rc") {
        out = &out[..idx];
    }
    out.trim().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
