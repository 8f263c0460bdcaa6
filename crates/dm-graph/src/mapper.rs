// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node and relationship payloads for graph import.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

const ID_FIELDS: &[&str] = &["analysis_id", "server_id", "service_id", "probe_id", "db_id"];

/// A node ready for graph import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node label from the enrichment stage (`Server`, `Database`, ...).
    pub label: String,
    /// Pruned node properties.
    pub properties: Map<String, Value>,
    /// Outgoing edges.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<GraphRelationship>,
}

/// An edge ready for graph import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    /// Upper-snake-cased edge type (`CONNECTS_TO`).
    #[serde(rename = "type")]
    pub rel_type: String,
    /// Source node entity id.
    pub start_node: Value,
    /// Target node entity id.
    pub end_node: Value,
    /// Edge properties: confidence and evidence.
    pub properties: Map<String, Value>,
}

/// Maps scored events into graph-import payloads.
///
/// Empty scalars and empty collections are pruned from node properties to
/// keep batch payloads small.
#[derive(Debug, Clone)]
pub struct GraphMapper {
    skip_empty: bool,
}

impl Default for GraphMapper {
    fn default() -> Self {
        Self { skip_empty: true }
    }
}

impl GraphMapper {
    /// Mapper with empty-value pruning enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep empty values instead of pruning them.
    pub fn keep_empty_values(mut self) -> Self {
        self.skip_empty = false;
        self
    }

    /// Map one event payload to a node.
    pub fn map_entity(&self, data: &Value) -> GraphNode {
        let enrichment = data.get("enrichment").cloned().unwrap_or_else(|| json!({}));
        let scoring = data.get("scoring").cloned().unwrap_or_else(|| json!({}));
        let label = enrichment
            .get("entity_label")
            .and_then(Value::as_str)
            .unwrap_or("Entity")
            .to_string();

        let mut props = Map::new();
        self.add(&mut props, "entity_id", entity_id(data));
        self.add(&mut props, "entity_category", enrichment.get("entity_category").cloned());
        self.add(&mut props, "environment", enrichment.get("environment").cloned());

        match label.as_str() {
            "Server" | "Infrastructure" => self.add_server_properties(&mut props, data),
            "Service" | "APIService" => self.add_service_properties(&mut props, data),
            "Database" | "RelationalDatabase" | "DocumentDatabase" | "KeyValueStore"
            | "SearchEngine" => self.add_database_properties(&mut props, data, &enrichment),
            "Application" | "WebApplication" | "BatchJob" | "Library" | "CLITool" => {
                self.add_application_properties(&mut props, data)
            }
            _ => {}
        }

        for score in ["complexity_score", "risk_score", "effort_score", "overall_score"] {
            self.add(&mut props, score, scoring.get(score).cloned());
        }
        if let Some(metadata) = data.get("metadata") {
            self.add(&mut props, "candidate_type", metadata.get("candidate_type").cloned());
            self.add(
                &mut props,
                "candidate_confidence",
                metadata.get("candidate_confidence").cloned(),
            );
        }

        let relationships = data
            .get("correlated_relationships")
            .and_then(Value::as_array)
            .map(|rels| rels.iter().map(map_relationship).collect())
            .unwrap_or_default();

        GraphNode {
            label,
            properties: props,
            relationships,
        }
    }

    /// Map a batch of event payloads to the graph import document.
    pub fn map_batch(&self, items: &[Value]) -> Value {
        let mut nodes = Vec::new();
        let mut all_relationships = Vec::new();

        for item in items {
            let mapped = self.map_entity(item);
            all_relationships.extend(mapped.relationships.clone());
            nodes.push(json!({
                "label": mapped.label,
                "properties": mapped.properties,
            }));
        }

        json!({
            "format": "graph",
            "version": "1.0.0",
            "nodes": nodes,
            "relationships": all_relationships,
            "metadata": {
                "node_count": nodes.len(),
                "relationship_count": all_relationships.len(),
            },
        })
    }

    fn add_server_properties(&self, props: &mut Map<String, Value>, data: &Value) {
        self.add(props, "hostname", data.get("hostname").cloned());
        self.add(props, "ip_addresses", data.get("ip_addresses").cloned());
        self.add(props, "open_ports", data.get("open_ports").cloned());
        if let Some(os) = data.get("os").or_else(|| data.get("operating_system")) {
            self.add(props, "os_name", os.get("name").cloned());
            self.add(props, "os_version", os.get("version").cloned());
        }
    }

    fn add_service_properties(&self, props: &mut Map<String, Value>, data: &Value) {
        self.add(props, "ip", data.get("ip").cloned());
        self.add(props, "port", data.get("port").cloned());
        self.add(props, "protocol", data.get("protocol").cloned());
        self.add(props, "service_name", data.get("service").cloned());
        self.add(props, "service_version", data.get("version").cloned());
    }

    fn add_database_properties(
        &self,
        props: &mut Map<String, Value>,
        data: &Value,
        enrichment: &Value,
    ) {
        self.add(props, "db_type", data.get("db_type").cloned());
        self.add(props, "host", data.get("host").cloned());
        self.add(props, "port", data.get("port").cloned());
        self.add(props, "db_version", data.get("version").cloned());
        self.add(props, "db_category", enrichment.get("db_category").cloned());
        if let Some(databases) = data.get("databases").and_then(Value::as_array) {
            let names: Vec<Value> = databases
                .iter()
                .filter_map(|db| db.get("name").cloned())
                .collect();
            self.add(props, "database_names", Some(Value::Array(names)));
        }
    }

    fn add_application_properties(&self, props: &mut Map<String, Value>, data: &Value) {
        self.add(props, "repository_url", data.get("repository_url").cloned());
        self.add(props, "branch", data.get("branch").cloned());
        self.add(props, "application_type", data.get("application_type").cloned());

        if let Some(languages) = data.get("languages").and_then(Value::as_object) {
            let primary = languages
                .iter()
                .max_by(|(_, a), (_, b)| {
                    let pa = a.get("percentage").and_then(Value::as_f64).unwrap_or(0.0);
                    let pb = b.get("percentage").and_then(Value::as_f64).unwrap_or(0.0);
                    pa.total_cmp(&pb)
                })
                .map(|(name, _)| name.clone());
            self.add(props, "primary_language", primary.map(Value::String));
            self.add(
                props,
                "languages",
                Some(Value::Array(
                    languages.keys().cloned().map(Value::String).collect(),
                )),
            );
        }
        if let Some(frameworks) = data.get("frameworks").and_then(Value::as_array) {
            let names: Vec<Value> = frameworks
                .iter()
                .filter_map(|f| match f {
                    Value::String(s) => Some(Value::String(s.clone())),
                    Value::Object(o) => o.get("name").cloned(),
                    _ => None,
                })
                .collect();
            self.add(props, "frameworks", Some(Value::Array(names)));
        }
    }

    fn add(&self, props: &mut Map<String, Value>, key: &str, value: Option<Value>) {
        let Some(value) = value else { return };
        if self.skip_empty && is_empty(&value) {
            return;
        }
        props.insert(key.to_string(), value);
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn entity_id(data: &Value) -> Option<Value> {
    ID_FIELDS.iter().find_map(|f| data.get(*f).cloned())
}

fn map_relationship(rel: &Value) -> GraphRelationship {
    let rel_type = rel
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("relates_to")
        .to_uppercase()
        .replace('-', "_");
    let mut properties = Map::new();
    properties.insert(
        "confidence".into(),
        rel.get("confidence").cloned().unwrap_or(json!(0.5)),
    );
    properties.insert(
        "evidence".into(),
        rel.get("evidence").cloned().unwrap_or(Value::Null),
    );
    GraphRelationship {
        rel_type,
        start_node: rel.get("source_id").cloned().unwrap_or(Value::Null),
        end_node: rel.get("target_id").cloned().unwrap_or(Value::Null),
        properties,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn scored_database_event() -> Value {
        json!({
            "db_id": "db-1",
            "db_type": "postgresql",
            "host": "db.prod.internal",
            "port": 5432,
            "version": "14.2",
            "databases": [{"name": "app"}, {"name": "audit"}],
            "enrichment": {
                "entity_label": "RelationalDatabase",
                "entity_category": "data",
                "environment": "production",
                "db_category": "relational"
            },
            "scoring": {"complexity_score": 5, "risk_score": 7, "effort_score": 6, "overall_score": 6},
            "correlated_relationships": [{
                "type": "connects_to",
                "source_id": "svc-1",
                "target_id": "db-1",
                "confidence": 0.85,
                "evidence": "Connection to db.prod.internal:5432"
            }]
        })
    }

    #[test]
    fn maps_database_node() {
        let node = GraphMapper::new().map_entity(&scored_database_event());
        assert_eq!(node.label, "RelationalDatabase");
        assert_eq!(node.properties["entity_id"], json!("db-1"));
        assert_eq!(node.properties["db_category"], json!("relational"));
        assert_eq!(node.properties["database_names"], json!(["app", "audit"]));
        assert_eq!(node.properties["risk_score"], json!(7));
    }

    #[test]
    fn relationship_types_upper_snake_cased() {
        let node = GraphMapper::new().map_entity(&scored_database_event());
        assert_eq!(node.relationships.len(), 1);
        assert_eq!(node.relationships[0].rel_type, "CONNECTS_TO");
        assert_eq!(node.relationships[0].start_node, json!("svc-1"));
        assert_eq!(node.relationships[0].properties["confidence"], json!(0.85));
    }

    #[test]
    fn empty_values_pruned() {
        let node = GraphMapper::new().map_entity(&json!({
            "server_id": "s-1",
            "hostname": "",
            "ip_addresses": [],
            "enrichment": {"entity_label": "Server", "environment": "unknown"}
        }));
        assert!(!node.properties.contains_key("hostname"));
        assert!(!node.properties.contains_key("ip_addresses"));
        assert_eq!(node.properties["entity_id"], json!("s-1"));
    }

    #[test]
    fn keep_empty_values_mode() {
        let node = GraphMapper::new().keep_empty_values().map_entity(&json!({
            "server_id": "s-1",
            "hostname": "",
            "enrichment": {"entity_label": "Server"}
        }));
        assert_eq!(node.properties["hostname"], json!(""));
    }

    #[test]
    fn application_primary_language_by_percentage() {
        let node = GraphMapper::new().map_entity(&json!({
            "analysis_id": "an-1",
            "repository_url": "file:///repos/shop",
            "languages": {
                "python": {"percentage": 70.0},
                "javascript": {"percentage": 30.0}
            },
            "frameworks": [{"name": "Django"}, "React"],
            "enrichment": {"entity_label": "Application"}
        }));
        assert_eq!(node.properties["primary_language"], json!("python"));
        assert_eq!(node.properties["frameworks"], json!(["Django", "React"]));
    }

    #[test]
    fn unknown_label_defaults_to_entity() {
        let node = GraphMapper::new().map_entity(&json!({"mystery": 1}));
        assert_eq!(node.label, "Entity");
    }

    #[test]
    fn batch_document_shape() {
        let mapper = GraphMapper::new();
        let batch = mapper.map_batch(&[scored_database_event(), json!({"server_id": "s-2"})]);
        assert_eq!(batch["format"], json!("graph"));
        assert_eq!(batch["metadata"]["node_count"], json!(2));
        assert_eq!(batch["metadata"]["relationship_count"], json!(1));
        assert_eq!(batch["nodes"].as_array().unwrap().len(), 2);
    }
}
