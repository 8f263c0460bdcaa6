// SPDX-License-Identifier: MIT OR Apache-2.0
//! Entity kinds, deterministic identifiers, and typed relationships.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// The variants of a discovered item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A host reachable on the network.
    Server,
    /// A listening service on a host.
    Service,
    /// A database instance.
    Database,
    /// A schema inside a database.
    Schema,
    /// A foreign-key or cross-schema relationship found by deep inspection.
    Relationship,
    /// A source-code repository.
    Repository,
    /// Codebase-level metrics for a repository.
    Codebase,
    /// A single dependency of a repository.
    Dependency,
    /// System information gathered by the infrastructure probe.
    Infrastructure,
}

impl EntityKind {
    /// snake_case name used in routing keys and event types.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Service => "service",
            Self::Database => "database",
            Self::Schema => "schema",
            Self::Relationship => "relationship",
            Self::Repository => "repository",
            Self::Codebase => "codebase",
            Self::Dependency => "dependency",
            Self::Infrastructure => "infrastructure",
        }
    }

    /// Parse the snake_case name back into a kind.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "server" => Self::Server,
            "service" => Self::Service,
            "database" => Self::Database,
            "schema" => Self::Schema,
            "relationship" => Self::Relationship,
            "repository" => Self::Repository,
            "codebase" => Self::Codebase,
            "dependency" => Self::Dependency,
            "infrastructure" => Self::Infrastructure,
            _ => return None,
        })
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Entity identifiers
// ---------------------------------------------------------------------------

/// Deterministic entity identifier: 16 hex chars of SHA-256 over the
/// non-empty identifying parts joined with `:`.
///
/// The same fields always hash to the same id, which is what makes
/// correlation and deduplication idempotent across replays.
pub fn entity_id<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = parts
        .into_iter()
        .filter(|p| !p.as_ref().is_empty())
        .map(|p| p.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(":");
    let digest = Sha256::digest(joined.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// Directed relationship types between entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Source opens connections to target.
    ConnectsTo,
    /// Source runs on target.
    DeployedOn,
    /// Source requires target to build or run.
    DependsOn,
    /// Source provides the runtime for target.
    Hosts,
    /// Source consumes target as a backing store.
    Uses,
    /// Source is a component of target.
    PartOf,
}

impl RelationshipType {
    /// snake_case wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectsTo => "connects_to",
            Self::DeployedOn => "deployed_on",
            Self::DependsOn => "depends_on",
            Self::Hosts => "hosts",
            Self::Uses => "uses",
            Self::PartOf => "part_of",
        }
    }

    /// Graph-import convention: UPPER_SNAKE_CASE.
    pub fn graph_name(self) -> String {
        self.as_str().to_uppercase()
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed edge between two entity ids with supporting evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Edge type.
    #[serde(rename = "type")]
    pub rel_type: RelationshipType,
    /// Source entity id.
    pub source_id: String,
    /// Source entity kind name.
    pub source_type: String,
    /// Target entity id.
    pub target_id: String,
    /// Target entity kind name.
    pub target_type: String,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f64,
    /// Human-readable evidence for the edge.
    pub evidence: String,
}

impl Relationship {
    /// Dedup key: `(type, source_id, target_id)`.
    pub fn dedup_key(&self) -> (RelationshipType, &str, &str) {
        (self.rel_type, &self.source_id, &self.target_id)
    }
}

/// Drop duplicate edges, keeping first occurrence order.
pub fn dedup_relationships(rels: Vec<Relationship>) -> Vec<Relationship> {
    let mut seen = std::collections::HashSet::new();
    rels.into_iter()
        .filter(|r| {
            let key = (r.rel_type, r.source_id.clone(), r.target_id.clone());
            seen.insert(key)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// DiscoveredRecord
// ---------------------------------------------------------------------------

/// One record produced by a collector, ready for publication.
///
/// The payload is intentionally untyped: each collector shapes its own
/// `data`, and the processor works structurally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredRecord {
    /// What kind of entity this record describes.
    pub kind: EntityKind,
    /// The discovered payload.
    pub data: serde_json::Value,
}

impl DiscoveredRecord {
    /// Build a record from a kind and any serialisable payload.
    pub fn new(kind: EntityKind, data: serde_json::Value) -> Self {
        Self { kind, data }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_round_trips() {
        for kind in [
            EntityKind::Server,
            EntityKind::Service,
            EntityKind::Database,
            EntityKind::Schema,
            EntityKind::Relationship,
            EntityKind::Repository,
            EntityKind::Codebase,
            EntityKind::Dependency,
            EntityKind::Infrastructure,
        ] {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("widget"), None);
    }

    #[test]
    fn entity_id_is_deterministic() {
        let a = entity_id(["service", "10.0.0.5", "5432"]);
        let b = entity_id(["service", "10.0.0.5", "5432"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn entity_id_skips_empty_parts() {
        let with_empty = entity_id(["database", "", "db.local", "3306"]);
        let without = entity_id(["database", "db.local", "3306"]);
        assert_eq!(with_empty, without);
    }

    #[test]
    fn entity_id_differs_by_part() {
        assert_ne!(
            entity_id(["service", "10.0.0.5", "5432"]),
            entity_id(["service", "10.0.0.5", "5433"])
        );
    }

    #[test]
    fn relationship_graph_name_upper_snake() {
        assert_eq!(RelationshipType::ConnectsTo.graph_name(), "CONNECTS_TO");
        assert_eq!(RelationshipType::DeployedOn.graph_name(), "DEPLOYED_ON");
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let edge = |t, s: &str, d: &str, conf| Relationship {
            rel_type: t,
            source_id: s.into(),
            source_type: "service".into(),
            target_id: d.into(),
            target_type: "database".into(),
            confidence: conf,
            evidence: "test".into(),
        };
        let rels = vec![
            edge(RelationshipType::Uses, "a", "b", 0.9),
            edge(RelationshipType::Uses, "a", "b", 0.1),
            edge(RelationshipType::ConnectsTo, "a", "b", 0.5),
        ];
        let unique = dedup_relationships(rels);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].confidence, 0.9);
    }
}
