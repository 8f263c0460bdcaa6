// SPDX-License-Identifier: MIT OR Apache-2.0
//! Batch output encodings.
//!
//! `raw` passes the approved events through untransformed; `graph` maps
//! them into node/relationship payloads and attaches a claims list. The
//! encoded document travels as the `discoveries` value of the egress body.

use dm_graph::{ClaimBuilder, GraphMapper};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Selected output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Pass events through untransformed.
    Raw,
    /// Graph-import nodes, relationships, and claims.
    Graph,
}

impl OutputFormat {
    /// Parse the config string; unknown values fall back to raw.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "graph" => Self::Graph,
            _ => Self::Raw,
        }
    }
}

/// Encoder owning the graph mapper and claim builder.
pub struct BatchEncoder {
    format: OutputFormat,
    mapper: GraphMapper,
    claims: ClaimBuilder,
}

impl BatchEncoder {
    /// Encoder for the given format and claim cap.
    pub fn new(format: OutputFormat, max_claims: usize) -> Self {
        Self {
            format,
            mapper: GraphMapper::new(),
            claims: ClaimBuilder::new(max_claims),
        }
    }

    /// The configured format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Encode one batch of approved events. Items are the full CloudEvent
    /// envelopes; graph encoding works over their `data` payloads.
    pub fn encode(&self, items: &[Value]) -> Value {
        match self.format {
            OutputFormat::Raw => json!({
                "format": "raw",
                "version": "1.0.0",
                "items": items,
                "metadata": { "item_count": items.len() },
            }),
            OutputFormat::Graph => {
                let payloads: Vec<Value> = items
                    .iter()
                    .map(|item| item.get("data").cloned().unwrap_or_else(|| item.clone()))
                    .collect();
                let mut doc = self.mapper.map_batch(&payloads);
                let claims: Vec<_> = payloads
                    .iter()
                    .flat_map(|p| self.claims.build_claims(p))
                    .collect();
                doc["claims"] = serde_json::to_value(&claims).unwrap_or_else(|_| json!([]));
                doc
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: Value) -> Value {
        json!({
            "specversion": "1.0",
            "id": "ev-1",
            "source": "/platform/processor",
            "type": "discovery.server.scored",
            "time": "2024-01-01T00:00:00Z",
            "datacontenttype": "application/json",
            "data": data
        })
    }

    #[test]
    fn raw_encoding_passes_items_through() {
        let encoder = BatchEncoder::new(OutputFormat::Raw, 50);
        let items = vec![event(json!({"hostname": "a"})), event(json!({"hostname": "b"}))];
        let doc = encoder.encode(&items);
        assert_eq!(doc["format"], json!("raw"));
        assert_eq!(doc["metadata"]["item_count"], json!(2));
        assert_eq!(doc["items"].as_array().unwrap().len(), 2);
        assert_eq!(doc["items"][0]["data"]["hostname"], json!("a"));
    }

    #[test]
    fn graph_encoding_maps_payloads_and_claims() {
        let encoder = BatchEncoder::new(OutputFormat::Graph, 50);
        let items = vec![event(json!({
            "server_id": "srv-1",
            "hostname": "web-01",
            "enrichment": {"entity_label": "Server", "environment": "production"}
        }))];
        let doc = encoder.encode(&items);
        assert_eq!(doc["format"], json!("graph"));
        assert_eq!(doc["nodes"][0]["label"], json!("Server"));
        assert!(!doc["claims"].as_array().unwrap().is_empty());
    }

    #[test]
    fn format_parsing_defaults_to_raw() {
        assert_eq!(OutputFormat::parse("graph"), OutputFormat::Graph);
        assert_eq!(OutputFormat::parse("Graph"), OutputFormat::Graph);
        assert_eq!(OutputFormat::parse("raw"), OutputFormat::Raw);
        assert_eq!(OutputFormat::parse("neo4j"), OutputFormat::Raw);
    }
}
