// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stage 1: database candidate identification.
//!
//! Collectors flag services on well-known database ports at confidence 0.5
//! ("port only"). This stage validates those flags against the service
//! banner and raises confidence to 0.85 ("port and banner") on a match; it
//! also catches candidates the collector missed.

use regex::RegexBuilder;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;
use tracing::debug;

/// Confidence assigned when only the port matched.
pub const CONFIDENCE_PORT_ONLY: f64 = 0.5;
/// Confidence assigned when the banner confirms the candidate type.
pub const CONFIDENCE_PORT_AND_BANNER: f64 = 0.85;

/// Well-known database ports and their types.
pub const DATABASE_PORTS: &[(u16, &str)] = &[
    (3306, "mysql"),
    (5432, "postgresql"),
    (27017, "mongodb"),
    (6379, "redis"),
    (1433, "mssql"),
    (1521, "oracle"),
    (5984, "couchdb"),
    (9042, "cassandra"),
    (9200, "elasticsearch"),
];

/// Case-insensitive banner patterns per database type.
static BANNER_PATTERNS: LazyLock<Vec<(&'static str, Vec<regex::Regex>)>> = LazyLock::new(|| {
    let compile = |patterns: &[&str]| {
        patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .expect("banner pattern is valid")
            })
            .collect()
    };
    vec![
        ("mysql", compile(&["mysql", "mariadb"])),
        ("postgresql", compile(&["postgresql", "postgres", "pg_", "psql"])),
        ("mongodb", compile(&["mongodb", "mongo", "ismaster"])),
        ("redis", compile(&["redis", r"\+pong"])),
        ("mssql", compile(&["microsoft sql server", "mssql", "sqlserver", "tds"])),
        ("oracle", compile(&["oracle", "tns", r"ora-\d+"])),
        ("couchdb", compile(&["couchdb", "couch"])),
        ("cassandra", compile(&["cassandra", "datastax"])),
        (
            "elasticsearch",
            compile(&["elasticsearch", "elastic", "\"cluster_name\""]),
        ),
    ]
});

/// Database type for a well-known port.
pub fn port_database_type(port: u16) -> Option<&'static str> {
    DATABASE_PORTS
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, t)| *t)
}

/// Whether the banner matches the expected patterns for a database type.
pub fn banner_matches(db_type: &str, banner: &str) -> bool {
    if banner.is_empty() {
        return false;
    }
    BANNER_PATTERNS
        .iter()
        .find(|(t, _)| t.eq_ignore_ascii_case(db_type))
        .map(|(_, patterns)| patterns.iter().any(|p| p.is_match(banner)))
        .unwrap_or(false)
}

/// Apply the candidate rules to one payload, in place.
pub fn process(data: &mut Value) {
    let Some(obj) = data.as_object_mut() else {
        return;
    };
    if !obj.get("metadata").map(Value::is_object).unwrap_or(false) {
        obj.insert("metadata".to_string(), json!({}));
    }

    let port = obj.get("port").and_then(Value::as_u64).map(|p| p as u16);
    let banner = obj
        .get("banner")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let flagged = obj
        .get("metadata")
        .and_then(|m| m.get("database_candidate"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let metadata = obj
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .expect("metadata was just ensured");

    if flagged {
        validate_candidate(metadata, port, &banner);
    } else if let Some(port) = port {
        identify_candidate(metadata, port, &banner);
    }
}

/// Validate a collector-flagged candidate, raising confidence on a banner
/// match and recording a mismatch otherwise.
fn validate_candidate(metadata: &mut Map<String, Value>, port: Option<u16>, banner: &str) {
    let confidence = metadata
        .get("candidate_confidence")
        .and_then(Value::as_f64)
        .unwrap_or(CONFIDENCE_PORT_ONLY);
    if confidence >= CONFIDENCE_PORT_AND_BANNER {
        debug!(?port, confidence, "candidate already validated");
        return;
    }
    let candidate_type = metadata
        .get("candidate_type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if banner.is_empty() || candidate_type.is_empty() {
        return;
    }

    if banner_matches(&candidate_type, banner) {
        metadata.insert("candidate_confidence".into(), json!(CONFIDENCE_PORT_AND_BANNER));
        metadata.insert(
            "candidate_reason".into(),
            json!(format!(
                "Port {} + banner match for {candidate_type}",
                port.map(|p| p.to_string()).unwrap_or_default()
            )),
        );
        metadata.insert("validation_method".into(), json!("port_and_banner"));
        debug!(?port, candidate_type, "candidate confidence raised");
    } else {
        metadata.insert("banner_mismatch".into(), json!(true));
        metadata.insert("validation_method".into(), json!("port_only"));
        debug!(?port, candidate_type, "candidate banner mismatch");
    }
}

/// Flag a candidate the collector missed, when the port is well known.
fn identify_candidate(metadata: &mut Map<String, Value>, port: u16, banner: &str) {
    let Some(db_type) = port_database_type(port) else {
        return;
    };

    if banner_matches(db_type, banner) {
        metadata.insert("database_candidate".into(), json!(true));
        metadata.insert("candidate_type".into(), json!(db_type));
        metadata.insert("candidate_confidence".into(), json!(CONFIDENCE_PORT_AND_BANNER));
        metadata.insert(
            "candidate_reason".into(),
            json!(format!("Port {port} + banner match for {db_type}")),
        );
        metadata.insert("validation_method".into(), json!("port_and_banner"));
    } else {
        metadata.insert("database_candidate".into(), json!(true));
        metadata.insert("candidate_type".into(), json!(db_type));
        metadata.insert("candidate_confidence".into(), json!(CONFIDENCE_PORT_ONLY));
        metadata.insert(
            "candidate_reason".into(),
            json!(format!("Port {port} matches {db_type} default port")),
        );
        metadata.insert("validation_method".into(), json!("port_only"));
        // A present-but-unmatched banner is recorded here so the
        // validation path reproduces this exact state on replay.
        if !banner.is_empty() {
            metadata.insert("banner_mismatch".into(), json!(true));
        }
    }
    metadata.insert("identified_by".into(), json!("processor"));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
