// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stage 2: enrichment.
//!
//! Detects the entity type from the data shape and attaches an
//! `enrichment` object: entity label and category, environment, and
//! per-type context (technology, database category, frameworks, OS
//! family). Everything is derived from base fields only, so re-running
//! the stage always reproduces the same object.

use serde_json::{Value, json};

/// Entity types the enricher distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedEntity {
    /// A host.
    Server,
    /// A listening service.
    Service,
    /// A database.
    Database,
    /// A code repository.
    Repository,
    /// Shape not recognised.
    Unknown,
}

impl DetectedEntity {
    /// snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Service => "service",
            Self::Database => "database",
            Self::Repository => "repository",
            Self::Unknown => "unknown",
        }
    }
}

/// Port → (technology, category) map for service enrichment.
const PORT_TECHNOLOGY: &[(u16, &str, &str)] = &[
    (22, "SSH", "infrastructure"),
    (80, "HTTP", "web"),
    (443, "HTTPS", "web"),
    (3306, "MySQL", "database"),
    (5432, "PostgreSQL", "database"),
    (6379, "Redis", "cache"),
    (27017, "MongoDB", "database"),
    (8080, "HTTP Alt", "web"),
    (8443, "HTTPS Alt", "web"),
    (9200, "Elasticsearch", "search"),
    (9092, "Kafka", "messaging"),
    (5672, "RabbitMQ", "messaging"),
    (15672, "RabbitMQ Management", "management"),
];

const ENVIRONMENT_PATTERNS: &[(&str, &[&str])] = &[
    ("production", &["prod", "prd", "live", "main"]),
    ("staging", &["stage", "staging", "stg", "uat"]),
    ("development", &["dev", "develop", "local", "test"]),
];

const FRAMEWORK_INDICATORS: &[(&str, &str)] = &[
    ("spring", "Spring Framework"),
    ("django", "Django"),
    ("flask", "Flask"),
    ("fastapi", "FastAPI"),
    ("express", "Express.js"),
    ("react", "React"),
    ("angular", "Angular"),
    ("vue", "Vue.js"),
    ("rails", "Ruby on Rails"),
    ("laravel", "Laravel"),
    (".net", ".NET"),
];

/// Detect the entity type from the data shape.
pub fn detect_entity_type(data: &Value) -> DetectedEntity {
    let has = |key: &str| data.get(key).is_some();
    if has("hostname") || has("ip_address") || has("ip_addresses") {
        if has("port") || has("ports") {
            return DetectedEntity::Service;
        }
        return DetectedEntity::Server;
    }
    if has("connection_string") || has("database_type") || has("db_type") {
        return DetectedEntity::Database;
    }
    if has("repository_url") || has("language") || has("languages") {
        return DetectedEntity::Repository;
    }
    DetectedEntity::Unknown
}

/// Substring-match the environment from a hostname or connection string.
pub fn detect_environment(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    for (env, tokens) in ENVIRONMENT_PATTERNS {
        if tokens.iter().any(|t| lower.contains(t)) {
            return env;
        }
    }
    "unknown"
}

/// Classify an OS name into a family.
pub fn classify_os(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.contains("windows") {
        "windows"
    } else if ["linux", "ubuntu", "centos", "rhel", "debian"]
        .iter()
        .any(|l| lower.contains(l))
    {
        "linux"
    } else if lower.contains("darwin") || lower.contains("macos") {
        "macos"
    } else {
        "unknown"
    }
}

/// Classify a database type into a storage category.
pub fn classify_database(db_type: &str) -> &'static str {
    match db_type.to_lowercase().as_str() {
        "mysql" | "mariadb" | "postgresql" | "postgres" | "oracle" | "mssql" => "relational",
        "mongodb" | "couchdb" | "dynamodb" => "document",
        "redis" | "memcached" => "key-value",
        "elasticsearch" | "solr" => "search",
        _ => "unknown",
    }
}

fn database_label(db_category: &str) -> &'static str {
    match db_category {
        "relational" => "RelationalDatabase",
        "document" => "DocumentDatabase",
        "key-value" => "KeyValueStore",
        "search" => "SearchEngine",
        _ => "Database",
    }
}

/// Detect frameworks from a dependency list.
pub fn detect_frameworks(dependencies: &[String]) -> Vec<String> {
    let lowered: Vec<String> = dependencies.iter().map(|d| d.to_lowercase()).collect();
    FRAMEWORK_INDICATORS
        .iter()
        .filter(|(indicator, _)| lowered.iter().any(|d| d.contains(indicator)))
        .map(|(_, framework)| framework.to_string())
        .collect()
}

fn dependency_names(data: &Value) -> Vec<String> {
    data.get("dependencies")
        .and_then(Value::as_array)
        .map(|deps| {
            deps.iter()
                .filter_map(|d| match d {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(o) => o.get("name").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Apply enrichment to one payload, in place. Returns the detected entity
/// type so later stages and routing can reuse it.
pub fn process(data: &mut Value) -> DetectedEntity {
    let entity = detect_entity_type(data);
    let mut enrichment = serde_json::Map::new();
    enrichment.insert("version".into(), json!("1.0.0"));
    enrichment.insert("applied".into(), json!(true));

    match entity {
        DetectedEntity::Server => {
            let hostname = data
                .get("hostname")
                .and_then(Value::as_str)
                .unwrap_or_default();
            enrichment.insert("entity_label".into(), json!("Server"));
            enrichment.insert("entity_category".into(), json!("compute"));
            enrichment.insert("environment".into(), json!(detect_environment(hostname)));
            if let Some(os_name) = data
                .get("os")
                .and_then(|os| os.get("name"))
                .and_then(Value::as_str)
            {
                enrichment.insert("os_family".into(), json!(classify_os(os_name)));
            }
        }
        DetectedEntity::Service => {
            let hostname = data
                .get("hostname")
                .and_then(Value::as_str)
                .unwrap_or_default();
            enrichment.insert("entity_label".into(), json!("Service"));
            enrichment.insert("entity_category".into(), json!("network"));
            enrichment.insert("environment".into(), json!(detect_environment(hostname)));
            if let Some(port) = data.get("port").and_then(Value::as_u64) {
                if let Some((_, tech, category)) =
                    PORT_TECHNOLOGY.iter().find(|(p, _, _)| *p as u64 == port)
                {
                    enrichment.insert("technology".into(), json!(tech));
                    enrichment.insert("category".into(), json!(category));
                }
            }
        }
        DetectedEntity::Database => {
            let db_type = data
                .get("db_type")
                .or_else(|| data.get("database_type"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let category = classify_database(db_type);
            enrichment.insert("entity_label".into(), json!(database_label(category)));
            enrichment.insert("entity_category".into(), json!("data"));
            enrichment.insert("db_category".into(), json!(category));
            let conn = data
                .get("connection_string")
                .and_then(Value::as_str)
                .unwrap_or_default();
            enrichment.insert("environment".into(), json!(detect_environment(conn)));
        }
        DetectedEntity::Repository => {
            enrichment.insert("entity_label".into(), json!("Application"));
            enrichment.insert("entity_category".into(), json!("application"));
            let language = data
                .get("language")
                .and_then(Value::as_str)
                .unwrap_or_default();
            enrichment.insert(
                "language_category".into(),
                json!(language_category(language)),
            );
            let frameworks = detect_frameworks(&dependency_names(data));
            enrichment.insert("frameworks".into(), json!(frameworks));
            let repo_url = data
                .get("repository_url")
                .and_then(Value::as_str)
                .unwrap_or_default();
            enrichment.insert("environment".into(), json!(detect_environment(repo_url)));
        }
        DetectedEntity::Unknown => {
            enrichment.insert("entity_label".into(), json!("Entity"));
            enrichment.insert("entity_category".into(), json!("unknown"));
            enrichment.insert("environment".into(), json!("unknown"));
        }
    }

    if let Some(obj) = data.as_object_mut() {
        obj.insert("enrichment".into(), Value::Object(enrichment));
    }
    entity
}

fn language_category(language: &str) -> &'static str {
    match language.to_lowercase().as_str() {
        "java" | "python" | "go" | "rust" | "c#" | "ruby" => "backend",
        "javascript" | "typescript" | "react" | "vue" | "angular" => "frontend",
        "swift" | "kotlin" => "mobile",
        "" => "other",
        _ => "other",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_enrichment() {
        let mut data = json!({
            "hostname": "db-prod-01",
            "ip_addresses": ["10.0.0.5"],
            "os": {"name": "Ubuntu 22.04"}
        });
        assert_eq!(process(&mut data), DetectedEntity::Server);
        let e = &data["enrichment"];
        assert_eq!(e["entity_label"], json!("Server"));
        assert_eq!(e["environment"], json!("production"));
        assert_eq!(e["os_family"], json!("linux"));
    }

    #[test]
    fn service_enrichment_uses_port_map() {
        let mut data = json!({"hostname": "cache-stg", "ip_address": "10.0.0.7", "port": 6379});
        assert_eq!(process(&mut data), DetectedEntity::Service);
        let e = &data["enrichment"];
        assert_eq!(e["technology"], json!("Redis"));
        assert_eq!(e["category"], json!("cache"));
        assert_eq!(e["environment"], json!("staging"));
    }

    #[test]
    fn database_enrichment_classifies_category() {
        let mut data = json!({
            "db_type": "postgresql",
            "connection_string": "postgres://db.dev.internal:5432/app"
        });
        assert_eq!(process(&mut data), DetectedEntity::Database);
        let e = &data["enrichment"];
        assert_eq!(e["db_category"], json!("relational"));
        assert_eq!(e["entity_label"], json!("RelationalDatabase"));
        assert_eq!(e["environment"], json!("development"));
    }

    #[test]
    fn repository_enrichment_detects_frameworks() {
        let mut data = json!({
            "repository_url": "file:///repos/shop",
            "language": "python",
            "dependencies": ["django", "celery", {"name": "react"}]
        });
        assert_eq!(process(&mut data), DetectedEntity::Repository);
        let e = &data["enrichment"];
        assert_eq!(e["language_category"], json!("backend"));
        let frameworks = e["frameworks"].as_array().unwrap();
        assert!(frameworks.contains(&json!("Django")));
        assert!(frameworks.contains(&json!("React")));
    }

    #[test]
    fn unknown_shape_gets_default_label() {
        let mut data = json!({"mystery": true});
        assert_eq!(process(&mut data), DetectedEntity::Unknown);
        assert_eq!(data["enrichment"]["entity_label"], json!("Entity"));
        assert_eq!(data["enrichment"]["environment"], json!("unknown"));
    }

    #[test]
    fn environment_token_matrix() {
        assert_eq!(detect_environment("app-prod-01"), "production");
        assert_eq!(detect_environment("db.live.example.com"), "production");
        assert_eq!(detect_environment("uat-gateway"), "staging");
        assert_eq!(detect_environment("local-sandbox"), "development");
        assert_eq!(detect_environment("gateway-7"), "unknown");
    }

    #[test]
    fn database_categories() {
        assert_eq!(classify_database("MariaDB"), "relational");
        assert_eq!(classify_database("mongodb"), "document");
        assert_eq!(classify_database("memcached"), "key-value");
        assert_eq!(classify_database("solr"), "search");
        assert_eq!(classify_database("graphite"), "unknown");
    }

    #[test]
    fn stage_is_idempotent() {
        let mut data = json!({"hostname": "web-prod", "ip_address": "1.2.3.4", "port": 443});
        process(&mut data);
        let once = data.clone();
        process(&mut data);
        assert_eq!(data, once);
    }
}
