// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed, confidence-tagged claims about discovered entities.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

/// Default cap on claims per entity.
pub const MAX_CLAIMS_PER_ENTITY: usize = 50;

/// Fixed confidence tiers.
pub mod confidence {
    /// Human-verified or authoritative source.
    pub const VERIFIED: f64 = 1.0;
    /// Strong automated detection.
    pub const HIGH: f64 = 0.9;
    /// Good automated detection.
    pub const MEDIUM_HIGH: f64 = 0.75;
    /// Reasonable automated detection.
    pub const MEDIUM: f64 = 0.5;
    /// Weak signal.
    pub const LOW: f64 = 0.25;
    /// Inferred from other data.
    pub const INFERRED: f64 = 0.1;
}

/// What kind of assertion a claim makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    /// Who or what the entity is.
    Identity,
    /// An attribute value.
    Property,
    /// A connection to another entity.
    Relationship,
    /// A category or type.
    Classification,
    /// A measured value.
    Metric,
    /// A current state.
    Status,
}

/// One assertion about an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Entity this claim is about; stamped by the builder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Assertion kind.
    #[serde(rename = "type")]
    pub claim_type: ClaimType,
    /// Attribute the claim asserts.
    pub attribute: String,
    /// Asserted value.
    pub value: Value,
    /// Confidence in `[0, 1]` (one of the fixed tiers, usually).
    pub confidence: f64,
    /// Detection source.
    pub source: String,
    /// Supporting evidence, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl Claim {
    fn new(
        claim_type: ClaimType,
        attribute: &str,
        value: Value,
        confidence: f64,
        source: &str,
    ) -> Self {
        Self {
            entity_id: None,
            claim_type,
            attribute: attribute.to_string(),
            value,
            confidence,
            source: source.to_string(),
            evidence: None,
        }
    }
}

/// Builds claims from a scored event payload.
///
/// Claims are sorted by descending confidence; when the per-entity cap is
/// hit, the lowest-confidence claims are dropped.
#[derive(Debug, Clone)]
pub struct ClaimBuilder {
    max_claims: usize,
}

impl Default for ClaimBuilder {
    fn default() -> Self {
        Self {
            max_claims: MAX_CLAIMS_PER_ENTITY,
        }
    }
}

impl ClaimBuilder {
    /// Builder with a custom claim cap.
    pub fn new(max_claims: usize) -> Self {
        Self { max_claims }
    }

    /// Build all claims for one event payload.
    pub fn build_claims(&self, data: &Value) -> Vec<Claim> {
        let empty = json!({});
        let enrichment = data.get("enrichment").unwrap_or(&empty);
        let scoring = data.get("scoring").unwrap_or(&empty);
        let metadata = data.get("metadata").unwrap_or(&empty);
        let entity_id = entity_id(data);

        let mut claims = Vec::new();
        claims.extend(identity_claims(data));
        claims.extend(classification_claims(enrichment, data));
        claims.extend(property_claims(data, metadata));
        claims.extend(metric_claims(scoring));
        claims.extend(relationship_claims(data));

        claims.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        claims.truncate(self.max_claims);
        for claim in &mut claims {
            claim.entity_id = entity_id.clone();
        }

        if !claims.is_empty() {
            debug!(
                count = claims.len(),
                entity_id = entity_id.as_deref().unwrap_or("unknown"),
                "claims built"
            );
        }
        claims
    }
}

fn entity_id(data: &Value) -> Option<String> {
    ["analysis_id", "server_id", "service_id", "probe_id", "db_id"]
        .iter()
        .find_map(|f| data.get(*f).and_then(Value::as_str).map(str::to_string))
}

fn identity_claims(data: &Value) -> Vec<Claim> {
    let mut claims = Vec::new();
    if let Some(hostname) = data.get("hostname").and_then(Value::as_str) {
        claims.push(Claim::new(
            ClaimType::Identity,
            "hostname",
            json!(hostname),
            confidence::HIGH,
            "network_scan",
        ));
    }
    if let Some(url) = data.get("repository_url").and_then(Value::as_str) {
        claims.push(Claim::new(
            ClaimType::Identity,
            "repository_url",
            json!(url),
            confidence::VERIFIED,
            "code_analysis",
        ));
    }
    if let Some(ips) = data.get("ip_addresses").and_then(Value::as_array) {
        for ip in ips.iter().filter_map(Value::as_str) {
            claims.push(Claim::new(
                ClaimType::Identity,
                "ip_address",
                json!(ip),
                confidence::VERIFIED,
                "network_scan",
            ));
        }
    }
    claims
}

fn classification_claims(enrichment: &Value, data: &Value) -> Vec<Claim> {
    let mut claims = Vec::new();
    if let Some(label) = enrichment.get("entity_label").and_then(Value::as_str) {
        claims.push(Claim::new(
            ClaimType::Classification,
            "entity_type",
            json!(label),
            confidence::HIGH,
            "enrichment",
        ));
    }
    if let Some(category) = enrichment.get("entity_category").and_then(Value::as_str) {
        claims.push(Claim::new(
            ClaimType::Classification,
            "entity_category",
            json!(category),
            confidence::HIGH,
            "enrichment",
        ));
    }
    if let Some(environment) = enrichment.get("environment").and_then(Value::as_str) {
        let tier = if environment == "unknown" {
            confidence::LOW
        } else {
            confidence::MEDIUM_HIGH
        };
        claims.push(Claim::new(
            ClaimType::Classification,
            "environment",
            json!(environment),
            tier,
            "pattern_matching",
        ));
    }
    if let Some(app_type) = data.get("application_type").and_then(Value::as_str) {
        claims.push(Claim::new(
            ClaimType::Classification,
            "application_type",
            json!(app_type),
            confidence::MEDIUM_HIGH,
            "code_analysis",
        ));
    }
    claims
}

fn property_claims(data: &Value, metadata: &Value) -> Vec<Claim> {
    let mut claims = Vec::new();
    if let Some(db_type) = data.get("db_type").and_then(Value::as_str) {
        claims.push(Claim::new(
            ClaimType::Property,
            "database_type",
            json!(db_type),
            confidence::HIGH,
            "db_inspector",
        ));
    }
    if let Some(version) = data.get("version").and_then(Value::as_str) {
        claims.push(Claim::new(
            ClaimType::Property,
            "version",
            json!(version),
            confidence::HIGH,
            "banner_detection",
        ));
    }
    if let Some(candidate_type) = metadata.get("candidate_type").and_then(Value::as_str) {
        claims.push(Claim::new(
            ClaimType::Property,
            "candidate_type",
            json!(candidate_type),
            metadata
                .get("candidate_confidence")
                .and_then(Value::as_f64)
                .unwrap_or(confidence::MEDIUM),
            "candidate_identification",
        ));
    }
    if let Some(frameworks) = data.get("frameworks").and_then(Value::as_array) {
        for framework in frameworks.iter().take(5) {
            let (name, tier) = match framework {
                Value::String(s) => (s.clone(), confidence::MEDIUM),
                Value::Object(o) => {
                    let Some(name) = o.get("name").and_then(Value::as_str) else {
                        continue;
                    };
                    (
                        name.to_string(),
                        o.get("confidence")
                            .and_then(Value::as_f64)
                            .unwrap_or(confidence::MEDIUM),
                    )
                }
                _ => continue,
            };
            claims.push(Claim::new(
                ClaimType::Property,
                "uses_framework",
                json!(name),
                tier,
                "dependency_analysis",
            ));
        }
    }
    claims
}

fn metric_claims(scoring: &Value) -> Vec<Claim> {
    let mut claims = Vec::new();
    for (score_key, attribute) in [
        ("complexity_score", "complexity"),
        ("risk_score", "risk"),
        ("effort_score", "migration_effort"),
        ("overall_score", "migration_priority"),
    ] {
        if let Some(value) = scoring.get(score_key) {
            claims.push(Claim::new(
                ClaimType::Metric,
                attribute,
                value.clone(),
                confidence::HIGH,
                "scoring_algorithm",
            ));
        }
    }
    if let Some(factors) = scoring.get("factors").and_then(Value::as_array) {
        for factor in factors.iter().take(5) {
            claims.push(Claim::new(
                ClaimType::Status,
                "scoring_factor",
                factor.clone(),
                confidence::MEDIUM,
                "scoring_algorithm",
            ));
        }
    }
    claims
}

fn relationship_claims(data: &Value) -> Vec<Claim> {
    let mut claims = Vec::new();
    if let Some(rels) = data.get("correlated_relationships").and_then(Value::as_array) {
        for rel in rels.iter().take(10) {
            let mut claim = Claim::new(
                ClaimType::Relationship,
                rel.get("type").and_then(Value::as_str).unwrap_or("relates_to"),
                json!({
                    "target_id": rel.get("target_id"),
                    "target_type": rel.get("target_type"),
                }),
                rel.get("confidence")
                    .and_then(Value::as_f64)
                    .unwrap_or(confidence::MEDIUM),
                "correlation",
            );
            claim.evidence = rel
                .get("evidence")
                .and_then(Value::as_str)
                .map(str::to_string);
            claims.push(claim);
        }
    }
    claims
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn scored_event() -> Value {
        json!({
            "server_id": "srv-1",
            "hostname": "web-prod-01",
            "ip_addresses": ["10.0.0.5", "10.0.0.6"],
            "enrichment": {
                "entity_label": "Server",
                "entity_category": "compute",
                "environment": "production"
            },
            "scoring": {
                "complexity_score": 4,
                "risk_score": 7,
                "effort_score": 5,
                "overall_score": 6,
                "factors": ["Production environment"]
            },
            "correlated_relationships": [{
                "type": "hosts",
                "target_id": "svc-1",
                "target_type": "service",
                "confidence": 0.95,
                "evidence": "Service on IP 10.0.0.5"
            }]
        })
    }

    #[test]
    fn claims_are_stamped_and_sorted() {
        let claims = ClaimBuilder::default().build_claims(&scored_event());
        assert!(!claims.is_empty());
        for claim in &claims {
            assert_eq!(claim.entity_id.as_deref(), Some("srv-1"));
        }
        for pair in claims.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn cap_drops_lowest_confidence() {
        let claims = ClaimBuilder::new(3).build_claims(&scored_event());
        assert_eq!(claims.len(), 3);
        // Verified identity claims survive the cut.
        assert!(claims.iter().all(|c| c.confidence >= confidence::HIGH));
    }

    #[test]
    fn environment_unknown_gets_low_tier() {
        let data = json!({
            "server_id": "s",
            "enrichment": {"environment": "unknown"}
        });
        let claims = ClaimBuilder::default().build_claims(&data);
        let env = claims
            .iter()
            .find(|c| c.attribute == "environment")
            .unwrap();
        assert_eq!(env.confidence, confidence::LOW);
    }

    #[test]
    fn relationship_claims_carry_evidence() {
        let claims = ClaimBuilder::default().build_claims(&scored_event());
        let rel = claims
            .iter()
            .find(|c| c.claim_type == ClaimType::Relationship)
            .unwrap();
        assert_eq!(rel.attribute, "hosts");
        assert_eq!(rel.evidence.as_deref(), Some("Service on IP 10.0.0.5"));
        assert_eq!(rel.value["target_id"], json!("svc-1"));
    }

    #[test]
    fn metric_claims_from_scoring() {
        let claims = ClaimBuilder::default().build_claims(&scored_event());
        let metrics: Vec<_> = claims
            .iter()
            .filter(|c| c.claim_type == ClaimType::Metric)
            .collect();
        assert_eq!(metrics.len(), 4);
        assert!(metrics.iter().any(|c| c.attribute == "migration_priority"));
    }

    #[test]
    fn empty_event_yields_no_claims() {
        let claims = ClaimBuilder::default().build_claims(&json!({}));
        assert!(claims.is_empty());
    }

    #[test]
    fn claim_serialises_with_type_tag() {
        let claims = ClaimBuilder::default().build_claims(&scored_event());
        let raw = serde_json::to_value(&claims[0]).unwrap();
        assert!(raw.get("type").is_some());
        assert!(raw.get("entity_id").is_some());
    }
}
