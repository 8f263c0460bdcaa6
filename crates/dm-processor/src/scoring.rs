// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stage 4: scoring.
//!
//! Computes four integer scores on the 1–10 scale from fixed tables:
//! complexity, risk, effort, and the weighted overall score
//! `round(0.2·complexity + 0.5·risk + 0.3·effort)`. A short list of
//! human-readable factors records which signals contributed.

use serde_json::{Value, json};

/// Technology complexity weights (1–10).
const TECHNOLOGY_COMPLEXITY: &[(&str, i64)] = &[
    // Databases
    ("postgresql", 5),
    ("mysql", 5),
    ("mariadb", 5),
    ("mongodb", 6),
    ("redis", 3),
    ("elasticsearch", 7),
    ("oracle", 9),
    ("mssql", 8),
    ("db2", 9),
    // Web frameworks
    ("spring framework", 7),
    ("django", 5),
    ("flask", 3),
    ("fastapi", 4),
    ("express.js", 4),
    ("react", 5),
    ("angular", 6),
    ("vue.js", 4),
    (".net", 7),
    ("ruby on rails", 6),
    ("laravel", 5),
    // Infrastructure
    ("ssh", 2),
    ("http", 2),
    ("https", 2),
    ("rabbitmq", 5),
    ("kafka", 8),
];

const ENVIRONMENT_RISK: &[(&str, i64)] = &[
    ("production", 3),
    ("staging", 2),
    ("development", 1),
    ("unknown", 2),
];

const DB_CATEGORY_COMPLEXITY: &[(&str, i64)] = &[
    ("relational", 5),
    ("document", 6),
    ("key-value", 3),
    ("search", 7),
    ("unknown", 5),
];

const LEGACY_TECHNOLOGIES: &[&str] = &["oracle", "db2", "mssql", ".net"];

fn table_lookup(table: &[(&str, i64)], key: &str) -> Option<i64> {
    let lower = key.to_lowercase();
    table.iter().find(|(k, _)| *k == lower).map(|(_, v)| *v)
}

fn clamp_score(value: f64) -> i64 {
    (value.round() as i64).clamp(1, 10)
}

fn average(scores: &[i64]) -> Option<i64> {
    if scores.is_empty() {
        return None;
    }
    let sum: i64 = scores.iter().sum();
    Some(clamp_score(sum as f64 / scores.len() as f64))
}

fn enrichment<'a>(data: &'a Value) -> Option<&'a Value> {
    data.get("enrichment")
}

fn str_field<'a>(value: Option<&'a Value>, key: &str) -> &'a str {
    value
        .and_then(|v| v.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn frameworks(data: &Value) -> Vec<String> {
    enrichment(data)
        .and_then(|e| e.get("frameworks"))
        .and_then(Value::as_array)
        .map(|f| {
            f.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn dependency_count(data: &Value) -> usize {
    data.get("dependencies")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

fn redaction_applied(data: &Value) -> bool {
    data.get("redaction")
        .and_then(|r| r.get("applied"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Technology complexity score (1–10): average of the available signals,
/// defaulting to medium when nothing is known.
pub fn complexity_score(data: &Value) -> i64 {
    let e = enrichment(data);
    let mut scores = Vec::new();

    if let Some(s) = table_lookup(TECHNOLOGY_COMPLEXITY, str_field(e, "technology")) {
        scores.push(s);
    }
    for framework in frameworks(data) {
        if let Some(s) = table_lookup(TECHNOLOGY_COMPLEXITY, &framework) {
            scores.push(s);
        }
    }
    if let Some(s) = table_lookup(DB_CATEGORY_COMPLEXITY, str_field(e, "db_category")) {
        scores.push(s);
    }
    let deps = dependency_count(data);
    if deps > 0 {
        scores.push(match deps {
            d if d > 50 => 8,
            d if d > 20 => 6,
            d if d > 10 => 4,
            _ => 2,
        });
    }

    average(&scores).unwrap_or(5)
}

/// Risk score (1–10): weighted blend of environment, category, and PII
/// presence.
pub fn risk_score(data: &Value) -> i64 {
    let e = enrichment(data);
    let mut factors = Vec::new();

    let env = str_field(e, "environment");
    let env_risk = table_lookup(ENVIRONMENT_RISK, if env.is_empty() { "unknown" } else { env })
        .unwrap_or(2);
    factors.push(env_risk * 2);

    match str_field(e, "category") {
        "database" => factors.push(7),
        "messaging" => factors.push(6),
        "infrastructure" => factors.push(5),
        "web" => factors.push(3),
        _ => {}
    }

    if redaction_applied(data) {
        factors.push(6);
    }

    average(&factors).unwrap_or(5)
}

/// Effort score (1–10): complexity plus migration-cost bonuses.
pub fn effort_score(data: &Value, complexity: i64) -> i64 {
    let e = enrichment(data);
    let mut factors = vec![complexity];

    if !str_field(e, "db_category").is_empty() {
        factors.push(7);
    }
    let technology = str_field(e, "technology").to_lowercase();
    if LEGACY_TECHNOLOGIES.contains(&technology.as_str()) {
        factors.push(8);
    }
    if frameworks(data).len() > 2 {
        factors.push(6);
    }
    if dependency_count(data) > 30 {
        factors.push(7);
    }

    average(&factors).unwrap_or(5)
}

/// Overall priority: `round(0.2·complexity + 0.5·risk + 0.3·effort)`.
pub fn overall_score(complexity: i64, risk: i64, effort: i64) -> i64 {
    clamp_score(complexity as f64 * 0.2 + risk as f64 * 0.5 + effort as f64 * 0.3)
}

fn scoring_factors(data: &Value) -> Vec<String> {
    let e = enrichment(data);
    let mut factors = Vec::new();

    if str_field(e, "environment") == "production" {
        factors.push("Production environment".to_string());
    }
    let db_category = str_field(e, "db_category");
    if !db_category.is_empty() {
        factors.push(format!("Database: {db_category}"));
    }
    let technology = str_field(e, "technology");
    if !technology.is_empty() {
        factors.push(format!("Technology: {technology}"));
    }
    let fw = frameworks(data);
    if !fw.is_empty() {
        factors.push(format!(
            "Frameworks: {}",
            fw.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
        ));
    }
    let deps = dependency_count(data);
    if deps > 20 {
        factors.push(format!("High dependency count: {deps}"));
    }
    if redaction_applied(data) {
        factors.push("Contains PII".to_string());
    }
    factors
}

/// Score one payload in place, attaching the `scoring` object.
pub fn process(data: &mut Value) {
    let complexity = complexity_score(data);
    let risk = risk_score(data);
    let effort = effort_score(data, complexity);
    let overall = overall_score(complexity, risk, effort);
    let factors = scoring_factors(data);

    if let Some(obj) = data.as_object_mut() {
        obj.insert(
            "scoring".into(),
            json!({
                "version": "1.0.0",
                "complexity_score": complexity,
                "risk_score": risk,
                "effort_score": effort,
                "overall_score": overall,
                "factors": factors,
            }),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scores_are_medium() {
        let data = json!({});
        assert_eq!(complexity_score(&data), 5);
        assert_eq!(effort_score(&data, 5), 5);
    }

    #[test]
    fn oracle_database_scores_high() {
        let data = json!({
            "enrichment": {
                "technology": "Oracle",
                "db_category": "relational",
                "environment": "production",
                "category": "database"
            }
        });
        // complexity: avg(9, 5) = 7
        assert_eq!(complexity_score(&data), 7);
        // risk: avg(3*2, 7) = round(6.5) = 7 (half away from zero)
        assert_eq!(risk_score(&data), 7);
        // effort: avg(7, 7 db, 8 legacy) = round(7.33) = 7
        assert_eq!(effort_score(&data, 7), 7);
        assert_eq!(overall_score(7, 7, 7), 7);
    }

    #[test]
    fn dependency_buckets() {
        let with_deps = |n: usize| {
            json!({
                "dependencies": (0..n).map(|i| json!(format!("dep{i}"))).collect::<Vec<_>>()
            })
        };
        assert_eq!(complexity_score(&with_deps(5)), 2);
        assert_eq!(complexity_score(&with_deps(15)), 4);
        assert_eq!(complexity_score(&with_deps(25)), 6);
        assert_eq!(complexity_score(&with_deps(60)), 8);
    }

    #[test]
    fn pii_presence_raises_risk() {
        let without = json!({"enrichment": {"environment": "development"}});
        let with = json!({
            "enrichment": {"environment": "development"},
            "redaction": {"applied": true}
        });
        assert!(risk_score(&with) > risk_score(&without));
    }

    #[test]
    fn web_category_lowers_risk_vs_database() {
        let web = json!({"enrichment": {"environment": "unknown", "category": "web"}});
        let db = json!({"enrichment": {"environment": "unknown", "category": "database"}});
        assert!(risk_score(&db) > risk_score(&web));
    }

    #[test]
    fn scores_stay_in_range() {
        for c in 1..=10 {
            for r in 1..=10 {
                for e in 1..=10 {
                    let overall = overall_score(c, r, e);
                    assert!((1..=10).contains(&overall));
                }
            }
        }
    }

    #[test]
    fn factors_trace_the_signals() {
        let data = json!({
            "enrichment": {
                "environment": "production",
                "db_category": "relational",
                "technology": "PostgreSQL",
                "frameworks": ["Django", "React", "Flask", "Vue.js"]
            },
            "dependencies": (0..25).map(|i| json!(format!("d{i}"))).collect::<Vec<_>>(),
            "redaction": {"applied": true}
        });
        let factors = scoring_factors(&data);
        assert!(factors.contains(&"Production environment".to_string()));
        assert!(factors.contains(&"Database: relational".to_string()));
        assert!(factors.contains(&"Technology: PostgreSQL".to_string()));
        assert!(factors.contains(&"Frameworks: Django, React, Flask".to_string()));
        assert!(factors.contains(&"High dependency count: 25".to_string()));
        assert!(factors.contains(&"Contains PII".to_string()));
    }

    #[test]
    fn process_attaches_scoring_block() {
        let mut data = json!({"enrichment": {"environment": "production", "category": "web"}});
        process(&mut data);
        let scoring = &data["scoring"];
        assert!(scoring["complexity_score"].is_i64());
        assert!(scoring["overall_score"].is_i64());
        assert!(scoring["factors"].is_array());
    }

    #[test]
    fn stage_is_idempotent() {
        let mut data = json!({
            "enrichment": {"environment": "production", "technology": "Kafka", "category": "messaging"},
            "redaction": {"applied": true}
        });
        process(&mut data);
        let once = data.clone();
        process(&mut data);
        assert_eq!(data, once);
    }
}
