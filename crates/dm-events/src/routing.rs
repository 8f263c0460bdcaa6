// SPDX-License-Identifier: MIT OR Apache-2.0
//! Exchange names, queue names, and the routing-key taxonomy.

use dm_core::EntityKind;

/// Durable topic exchange collectors publish to.
pub const DISCOVERY_EXCHANGE: &str = "discovery.events";

/// Durable topic exchange the processor publishes scored events to.
pub const PROCESSING_EXCHANGE: &str = "processing.events";

/// Queue consumed by the transmitter.
pub const TRANSMITTER_QUEUE: &str = "transmitter.approved";

/// Binding pattern for approved events.
pub const APPROVED_PATTERN: &str = "approved.*";

/// Processor queue bindings: `(queue, routing key)` on `discovery.events`.
pub const ENRICHMENT_BINDINGS: &[(&str, &str)] = &[
    ("enrichment.server.queue", "discovered.server"),
    ("enrichment.repository.queue", "discovered.repository"),
    ("enrichment.database.queue", "discovered.database"),
];

/// Routing key for a freshly discovered entity: `discovered.<entity>`.
pub fn discovered_key(kind: EntityKind) -> String {
    format!("discovered.{kind}")
}

/// Event type for a freshly discovered entity:
/// `discovery.<entity>.discovered`.
pub fn discovered_type(kind: EntityKind) -> String {
    format!("discovery.{kind}.discovered")
}

/// Routing key for a scored entity: `scored.<entity>`.
pub fn scored_key(entity: &str) -> String {
    format!("scored.{entity}")
}

/// Event type for a scored entity: `discovery.<entity>.scored`.
pub fn scored_type(entity: &str) -> String {
    format!("discovery.{entity}.scored")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovered_taxonomy() {
        assert_eq!(discovered_key(EntityKind::Server), "discovered.server");
        assert_eq!(
            discovered_type(EntityKind::Infrastructure),
            "discovery.infrastructure.discovered"
        );
    }

    #[test]
    fn scored_taxonomy() {
        assert_eq!(scored_key("database"), "scored.database");
        assert_eq!(scored_type("database"), "discovery.database.scored");
    }

    #[test]
    fn enrichment_bindings_cover_processed_kinds() {
        let keys: Vec<&str> = ENRICHMENT_BINDINGS.iter().map(|(_, k)| *k).collect();
        assert_eq!(
            keys,
            vec![
                "discovered.server",
                "discovered.repository",
                "discovered.database"
            ]
        );
    }
}
