// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stage 5: correlation.
//!
//! Maintains a process-local index of recently-seen entities keyed by
//! deterministic entity id and emits typed relationships: repositories
//! connect to the services their extracted connections point at, services
//! deploy onto servers, servers host services, infrastructure probes are
//! part of servers, and database candidates are used by their services.
//! Relationships are deduplicated on `(type, source, target)` so replays
//! are harmless.

use dm_core::{Relationship, RelationshipType, dedup_relationships, entity_id};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::debug;

/// One remembered entity.
#[derive(Debug, Clone)]
struct StoredEntity {
    id: String,
    entity_type: String,
    ip: Option<String>,
    ip_addresses: Vec<String>,
    connections: Vec<(String, u64)>,
}

/// Process-local correlation index.
///
/// At modest throughput an in-memory map suffices; cross-process
/// correlation would seed this from an external index keyed by entity id.
#[derive(Debug, Default)]
pub struct CorrelationStore {
    entities: HashMap<String, StoredEntity>,
}

impl CorrelationStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of remembered entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Correlate one payload in place: attach `correlated_relationships`
    /// and remember the entity for future events.
    pub fn process(&mut self, data: &mut Value) {
        let entity_type = detect_entity_type(data);
        let relationships = match entity_type {
            "repository" => self.correlate_repository(data),
            "service" => self.correlate_service(data),
            "database" => self.correlate_database(data),
            "server" => self.correlate_server(data),
            "infrastructure" => self.correlate_infrastructure(data),
            _ => Vec::new(),
        };
        let unique = dedup_relationships(relationships);
        debug!(entity_type, relationship_count = unique.len(), "correlation complete");

        if let Some(obj) = data.as_object_mut() {
            obj.insert(
                "correlated_relationships".into(),
                serde_json::to_value(&unique).unwrap_or_else(|_| json!([])),
            );
        }
        self.remember(data, entity_type);
    }

    fn correlate_repository(&self, data: &Value) -> Vec<Relationship> {
        let repo_id = get_entity_id(data, "repository");
        let mut rels = Vec::new();

        for conn in array(data, "extracted_connections") {
            let Some(host) = conn.get("host").and_then(Value::as_str) else {
                continue;
            };
            let port = conn.get("port").and_then(Value::as_u64).unwrap_or(0);
            let target_id = entity_id(["service", host, &port.to_string()]);
            rels.push(Relationship {
                rel_type: RelationshipType::ConnectsTo,
                source_id: repo_id.clone(),
                source_type: "repository".into(),
                target_id,
                target_type: conn
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("service")
                    .to_string(),
                confidence: 0.8,
                evidence: format!("Connection to {host}:{port}"),
            });
        }

        for dep in array(data, "dependencies") {
            let name = match dep {
                Value::String(s) => s.clone(),
                Value::Object(o) => o
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                _ => continue,
            };
            if name.is_empty() {
                continue;
            }
            rels.push(Relationship {
                rel_type: RelationshipType::DependsOn,
                source_id: repo_id.clone(),
                source_type: "repository".into(),
                target_id: entity_id(["dependency", &name]),
                target_type: "dependency".into(),
                confidence: 1.0,
                evidence: format!("Dependency: {name}"),
            });
        }
        rels
    }

    fn correlate_service(&self, data: &Value) -> Vec<Relationship> {
        let service_id = get_entity_id(data, "service");
        let mut rels = Vec::new();

        let server_id = data.get("server_id").and_then(Value::as_str);
        let ip = data.get("ip").and_then(Value::as_str);

        if let Some(server_id) = server_id {
            rels.push(Relationship {
                rel_type: RelationshipType::DeployedOn,
                source_id: service_id.clone(),
                source_type: "service".into(),
                target_id: server_id.to_string(),
                target_type: "server".into(),
                confidence: 1.0,
                evidence: "Same server_id".into(),
            });
        } else if let Some(ip) = ip {
            if let Some(server) = self.find_server_by_ip(ip) {
                rels.push(Relationship {
                    rel_type: RelationshipType::DeployedOn,
                    source_id: service_id.clone(),
                    source_type: "service".into(),
                    target_id: server.id.clone(),
                    target_type: "server".into(),
                    confidence: 0.9,
                    evidence: format!("IP match: {ip}"),
                });
            }
        }

        // Database candidates imply a service → database edge.
        if let Some(metadata) = data.get("metadata") {
            if metadata
                .get("database_candidate")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                let candidate_type = metadata
                    .get("candidate_type")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let port = data
                    .get("port")
                    .and_then(Value::as_u64)
                    .map(|p| p.to_string())
                    .unwrap_or_default();
                rels.push(Relationship {
                    rel_type: RelationshipType::Uses,
                    source_id: service_id.clone(),
                    source_type: "service".into(),
                    target_id: entity_id([
                        "database",
                        candidate_type,
                        ip.unwrap_or_default(),
                        &port,
                    ]),
                    target_type: "database".into(),
                    confidence: metadata
                        .get("candidate_confidence")
                        .and_then(Value::as_f64)
                        .unwrap_or(0.5),
                    evidence: metadata
                        .get("candidate_reason")
                        .and_then(Value::as_str)
                        .unwrap_or("Database port detected")
                        .to_string(),
                });
            }
        }
        rels
    }

    fn correlate_database(&self, data: &Value) -> Vec<Relationship> {
        let db_id = get_entity_id(data, "database");
        let mut rels = Vec::new();

        let host = data.get("host").and_then(Value::as_str);
        let port = data.get("port").and_then(Value::as_u64);
        if let (Some(host), Some(port)) = (host, port) {
            for entity in self.find_connecting_to(host, port) {
                rels.push(Relationship {
                    rel_type: RelationshipType::ConnectsTo,
                    source_id: entity.id.clone(),
                    source_type: entity.entity_type.clone(),
                    target_id: db_id.clone(),
                    target_type: "database".into(),
                    confidence: 0.85,
                    evidence: format!("Connection to {host}:{port}"),
                });
            }
        }
        rels
    }

    fn correlate_server(&self, data: &Value) -> Vec<Relationship> {
        let server_id = get_entity_id(data, "server");
        let mut rels = Vec::new();

        for ip in array(data, "ip_addresses")
            .iter()
            .filter_map(|v| v.as_str())
        {
            for service in self.find_services_on_ip(ip) {
                rels.push(Relationship {
                    rel_type: RelationshipType::Hosts,
                    source_id: server_id.clone(),
                    source_type: "server".into(),
                    target_id: service.id.clone(),
                    target_type: "service".into(),
                    confidence: 0.95,
                    evidence: format!("Service on IP {ip}"),
                });
            }
        }
        rels
    }

    fn correlate_infrastructure(&self, data: &Value) -> Vec<Relationship> {
        let infra_id = get_entity_id(data, "infrastructure");
        let mut rels = Vec::new();

        if let Some(server_id) = data.get("server_id").and_then(Value::as_str) {
            rels.push(Relationship {
                rel_type: RelationshipType::PartOf,
                source_id: infra_id,
                source_type: "infrastructure".into(),
                target_id: server_id.to_string(),
                target_type: "server".into(),
                confidence: 1.0,
                evidence: "Same server_id".into(),
            });
        } else if let Some(target_ip) = data.get("target_ip").and_then(Value::as_str) {
            if let Some(server) = self.find_server_by_ip(target_ip) {
                rels.push(Relationship {
                    rel_type: RelationshipType::PartOf,
                    source_id: infra_id,
                    source_type: "infrastructure".into(),
                    target_id: server.id.clone(),
                    target_type: "server".into(),
                    confidence: 0.9,
                    evidence: format!("IP match: {target_ip}"),
                });
            }
        }
        rels
    }

    fn remember(&mut self, data: &Value, entity_type: &str) {
        let id = get_entity_id(data, entity_type);
        let connections = array(data, "extracted_connections")
            .iter()
            .filter_map(|c| {
                let host = c.get("host").and_then(Value::as_str)?;
                let port = c.get("port").and_then(Value::as_u64)?;
                Some((host.to_string(), port))
            })
            .collect();
        let entity = StoredEntity {
            id: id.clone(),
            entity_type: entity_type.to_string(),
            ip: data
                .get("ip")
                .and_then(Value::as_str)
                .map(str::to_string),
            ip_addresses: array(data, "ip_addresses")
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            connections,
        };
        self.entities.insert(id, entity);
    }

    fn find_server_by_ip(&self, ip: &str) -> Option<&StoredEntity> {
        self.entities.values().find(|e| {
            e.entity_type == "server"
                && (e.ip.as_deref() == Some(ip) || e.ip_addresses.iter().any(|a| a == ip))
        })
    }

    fn find_services_on_ip(&self, ip: &str) -> Vec<&StoredEntity> {
        self.entities
            .values()
            .filter(|e| e.entity_type == "service" && e.ip.as_deref() == Some(ip))
            .collect()
    }

    fn find_connecting_to(&self, host: &str, port: u64) -> Vec<&StoredEntity> {
        self.entities
            .values()
            .filter(|e| e.connections.iter().any(|(h, p)| h == host && *p == port))
            .collect()
    }
}

fn array<'a>(data: &'a Value, key: &str) -> Vec<&'a Value> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().collect())
        .unwrap_or_default()
}

/// Entity type for correlation: enrichment label first, then data shape.
fn detect_entity_type(data: &Value) -> &'static str {
    let label = data
        .get("enrichment")
        .and_then(|e| e.get("entity_label"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();
    if !label.is_empty() {
        if label.contains("database") || label.contains("store") || label.contains("searchengine") {
            return "database";
        }
        if label.contains("application") || label.contains("repository") {
            return "repository";
        }
        if label.contains("server") && !label.contains("service") {
            return "server";
        }
        if label.contains("service") {
            return "service";
        }
        if label.contains("infrastructure") {
            return "infrastructure";
        }
    }

    let has = |key: &str| data.get(key).is_some();
    if has("repository_url") || has("analysis_id") {
        return "repository";
    }
    if has("db_type") || has("database_type") {
        return "database";
    }
    if has("port") && has("service") {
        return "service";
    }
    if has("ip_addresses") || has("server_id") {
        return "server";
    }
    if has("probe_id") {
        return "infrastructure";
    }
    "unknown"
}

/// Get or derive a deterministic id for the entity in `data`.
fn get_entity_id(data: &Value, entity_type: &str) -> String {
    let id_fields: &[&str] = match entity_type {
        "repository" => &["analysis_id"],
        "service" => &["service_id"],
        "database" => &["db_id", "database_id"],
        "server" => &["server_id"],
        "infrastructure" => &["probe_id"],
        _ => &[],
    };
    for field in id_fields {
        if let Some(id) = data.get(*field).and_then(Value::as_str) {
            return id.to_string();
        }
    }

    let s = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let n = |key: &str| {
        data.get(key)
            .and_then(Value::as_u64)
            .map(|v| v.to_string())
            .unwrap_or_default()
    };
    match entity_type {
        "repository" => entity_id(["repository", &s("repository_url")]),
        "service" => entity_id(["service", &s("ip"), &n("port"), &s("service")]),
        "database" => entity_id(["database", &s("db_type"), &s("host"), &n("port")]),
        "server" => {
            let mut parts = vec!["server".to_string()];
            parts.extend(
                array(data, "ip_addresses")
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string)),
            );
            entity_id(parts)
        }
        "infrastructure" => entity_id(["infrastructure", &s("target_ip")]),
        _ => entity_id([entity_type, &data.to_string()]),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
