// SPDX-License-Identifier: MIT OR Apache-2.0
//! Database connectors: PostgreSQL and MySQL/MariaDB.
//!
//! Each connector gathers the same inspection surface (version,
//! databases, schemas with table counts, foreign keys) and shapes it
//! into publishable records through one shared function, so the two
//! engines emit structurally identical payloads.

use async_trait::async_trait;
use dm_core::{DiscoveredRecord, EntityKind, Secret, entity_id};
use dm_error::{ErrorCode, MeshError};
use serde::Deserialize;
use serde_json::json;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::{MySqlPool, PgPool, Row};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One inspection target with opaque credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct InspectTarget {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Engine type (`postgresql`, `mysql`, `mariadb`).
    pub db_type: String,
    /// Login user.
    pub username: String,
    /// Login password; never rendered by `Debug`.
    pub password: Secret<String>,
    /// Initial database, when the engine needs one.
    #[serde(default)]
    pub database: Option<String>,
}

impl InspectTarget {
    /// Deterministic id of the inspected instance.
    pub fn db_id(&self) -> String {
        entity_id([
            "database",
            &self.db_type,
            &self.host,
            &self.port.to_string(),
        ])
    }

    /// `host:port` label for progress messages.
    pub fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Raw inspection data gathered by a connector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inspection {
    /// Server version string.
    pub version: String,
    /// Database names.
    pub databases: Vec<String>,
    /// `(schema, table_count)` pairs.
    pub schemas: Vec<(String, i64)>,
    /// Foreign keys: `(schema, table, referenced_schema, referenced_table)`.
    pub foreign_keys: Vec<(String, String, String, String)>,
}

/// A database engine connector.
#[async_trait]
pub trait DatabaseConnector: Send + Sync + std::fmt::Debug {
    /// Connect and gather the inspection surface.
    async fn inspect(&self, target: &InspectTarget) -> Result<Inspection, MeshError>;
}

/// Pick the connector for a target's engine type. Unknown types are a
/// validation error (HTTP 400 at the surface).
pub fn connector_for(db_type: &str) -> Result<Box<dyn DatabaseConnector>, MeshError> {
    match db_type.to_lowercase().as_str() {
        "postgresql" | "postgres" => Ok(Box::new(PostgresConnector)),
        "mysql" | "mariadb" => Ok(Box::new(MySqlConnector)),
        other => Err(MeshError::validation(format!("unknown db_type: {other}"))),
    }
}

/// Classify a connector error without echoing the driver message, which
/// can contain credential fragments from the connection string.
fn classify(e: sqlx::Error) -> MeshError {
    match &e {
        sqlx::Error::Database(db) if db.code().is_some() => MeshError::new(
            ErrorCode::AuthFailed,
            format!("DatabaseError[{}]", db.code().unwrap_or_default()),
        ),
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => {
            MeshError::new(ErrorCode::ConnectFailed, "IoError")
        }
        _ => MeshError::credential_safe(ErrorCode::ConnectFailed, &e),
    }
}

/// Shape the gathered inspection into publishable records: one
/// `database`, one `schema` per schema, one `relationship` per foreign
/// key.
pub fn shape_records(target: &InspectTarget, inspection: &Inspection) -> Vec<DiscoveredRecord> {
    let db_id = target.db_id();
    let mut records = vec![DiscoveredRecord::new(
        EntityKind::Database,
        json!({
            "db_id": db_id,
            "db_type": target.db_type.to_lowercase(),
            "host": target.host,
            "port": target.port,
            "version": inspection.version,
            "databases": inspection
                .databases
                .iter()
                .map(|name| json!({"name": name}))
                .collect::<Vec<_>>(),
        }),
    )];

    for (schema, table_count) in &inspection.schemas {
        records.push(DiscoveredRecord::new(
            EntityKind::Schema,
            json!({
                "schema_id": entity_id(["schema", &db_id, schema]),
                "db_id": db_id,
                "name": schema,
                "table_count": table_count,
            }),
        ));
    }

    for (schema, table, ref_schema, ref_table) in &inspection.foreign_keys {
        records.push(DiscoveredRecord::new(
            EntityKind::Relationship,
            json!({
                "relationship_id": entity_id([
                    "fk", &db_id, schema, table, ref_schema, ref_table
                ]),
                "db_id": db_id,
                "type": "foreign_key",
                "from_schema": schema,
                "from_table": table,
                "to_schema": ref_schema,
                "to_table": ref_table,
            }),
        ));
    }
    records
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

/// PostgreSQL connector over `information_schema` and catalogs.
#[derive(Debug)]
pub struct PostgresConnector;

impl PostgresConnector {
    async fn pool(&self, target: &InspectTarget) -> Result<PgPool, MeshError> {
        let url = format!(
            "postgres://{}:{}@{}:{}/{}",
            target.username,
            target.password.expose(),
            target.host,
            target.port,
            target.database.as_deref().unwrap_or("postgres"),
        );
        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect(&url)
            .await
            .map_err(classify)
    }
}

#[async_trait]
impl DatabaseConnector for PostgresConnector {
    async fn inspect(&self, target: &InspectTarget) -> Result<Inspection, MeshError> {
        let pool = self.pool(target).await?;

        let version: String = sqlx::query("SELECT version()")
            .fetch_one(&pool)
            .await
            .map_err(classify)?
            .get(0);

        let databases = sqlx::query(
            "SELECT datname FROM pg_database WHERE datistemplate = false ORDER BY datname",
        )
        .fetch_all(&pool)
        .await
        .map_err(classify)?
        .into_iter()
        .map(|row| row.get::<String, _>(0))
        .collect();

        let schemas = sqlx::query(
            r#"
            SELECT table_schema, COUNT(*)::bigint AS table_count
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
              AND table_schema NOT IN ('pg_catalog', 'information_schema')
            GROUP BY table_schema
            ORDER BY table_schema
            "#,
        )
        .fetch_all(&pool)
        .await
        .map_err(classify)?
        .into_iter()
        .map(|row| (row.get::<String, _>(0), row.get::<i64, _>(1)))
        .collect();

        let foreign_keys = sqlx::query(
            r#"
            SELECT tc.table_schema, tc.table_name,
                   ccu.table_schema AS ref_schema, ccu.table_name AS ref_table
            FROM information_schema.table_constraints tc
            JOIN information_schema.constraint_column_usage ccu
              ON tc.constraint_name = ccu.constraint_name
             AND tc.table_schema = ccu.constraint_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
            ORDER BY tc.table_schema, tc.table_name
            "#,
        )
        .fetch_all(&pool)
        .await
        .map_err(classify)?
        .into_iter()
        .map(|row| {
            (
                row.get::<String, _>(0),
                row.get::<String, _>(1),
                row.get::<String, _>(2),
                row.get::<String, _>(3),
            )
        })
        .collect();

        pool.close().await;
        Ok(Inspection {
            version,
            databases,
            schemas,
            foreign_keys,
        })
    }
}

// ---------------------------------------------------------------------------
// MySQL / MariaDB
// ---------------------------------------------------------------------------

/// MySQL and MariaDB connector over `information_schema`.
#[derive(Debug)]
pub struct MySqlConnector;

impl MySqlConnector {
    async fn pool(&self, target: &InspectTarget) -> Result<MySqlPool, MeshError> {
        let url = format!(
            "mysql://{}:{}@{}:{}/{}",
            target.username,
            target.password.expose(),
            target.host,
            target.port,
            target.database.as_deref().unwrap_or("information_schema"),
        );
        MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect(&url)
            .await
            .map_err(classify)
    }
}

#[async_trait]
impl DatabaseConnector for MySqlConnector {
    async fn inspect(&self, target: &InspectTarget) -> Result<Inspection, MeshError> {
        let pool = self.pool(target).await?;

        let version: String = sqlx::query("SELECT VERSION()")
            .fetch_one(&pool)
            .await
            .map_err(classify)?
            .get(0);

        let databases = sqlx::query(
            r#"
            SELECT schema_name FROM information_schema.schemata
            WHERE schema_name NOT IN
              ('information_schema', 'performance_schema', 'mysql', 'sys')
            ORDER BY schema_name
            "#,
        )
        .fetch_all(&pool)
        .await
        .map_err(classify)?
        .into_iter()
        .map(|row| row.get::<String, _>(0))
        .collect();

        let schemas = sqlx::query(
            r#"
            SELECT table_schema, CAST(COUNT(*) AS SIGNED) AS table_count
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
              AND table_schema NOT IN
                ('information_schema', 'performance_schema', 'mysql', 'sys')
            GROUP BY table_schema
            ORDER BY table_schema
            "#,
        )
        .fetch_all(&pool)
        .await
        .map_err(classify)?
        .into_iter()
        .map(|row| (row.get::<String, _>(0), row.get::<i64, _>(1)))
        .collect();

        let foreign_keys = sqlx::query(
            r#"
            SELECT table_schema, table_name,
                   referenced_table_schema, referenced_table_name
            FROM information_schema.key_column_usage
            WHERE referenced_table_name IS NOT NULL
            ORDER BY table_schema, table_name
            "#,
        )
        .fetch_all(&pool)
        .await
        .map_err(classify)?
        .into_iter()
        .map(|row| {
            (
                row.get::<String, _>(0),
                row.get::<String, _>(1),
                row.get::<String, _>(2),
                row.get::<String, _>(3),
            )
        })
        .collect();

        pool.close().await;
        Ok(Inspection {
            version,
            databases,
            schemas,
            foreign_keys,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> InspectTarget {
        serde_json::from_str(
            r#"{
                "host": "db.internal",
                "port": 5432,
                "db_type": "postgresql",
                "username": "inspector",
                "password": "s3cret"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn target_debug_never_shows_password() {
        let t = target();
        let rendered = format!("{t:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn db_id_is_deterministic() {
        assert_eq!(target().db_id(), target().db_id());
    }

    #[test]
    fn connector_dispatch() {
        assert!(connector_for("postgresql").is_ok());
        assert!(connector_for("Postgres").is_ok());
        assert!(connector_for("mysql").is_ok());
        assert!(connector_for("mariadb").is_ok());
        let err = connector_for("dbase").unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[test]
    fn shape_records_covers_all_kinds() {
        let inspection = Inspection {
            version: "PostgreSQL 14.2".to_string(),
            databases: vec!["app".to_string(), "audit".to_string()],
            schemas: vec![("public".to_string(), 12)],
            foreign_keys: vec![(
                "public".to_string(),
                "orders".to_string(),
                "public".to_string(),
                "customers".to_string(),
            )],
        };
        let records = shape_records(&target(), &inspection);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].kind, EntityKind::Database);
        assert_eq!(records[0].data["version"], json!("PostgreSQL 14.2"));
        assert_eq!(records[0].data["databases"][0]["name"], json!("app"));
        assert_eq!(records[1].kind, EntityKind::Schema);
        assert_eq!(records[1].data["table_count"], json!(12));
        assert_eq!(records[2].kind, EntityKind::Relationship);
        assert_eq!(records[2].data["from_table"], json!("orders"));
    }

    #[test]
    fn shaped_records_never_contain_credentials() {
        let inspection = Inspection::default();
        let records = shape_records(&target(), &inspection);
        let rendered = serde_json::to_string(&records).unwrap();
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("inspector"));
    }

    #[tokio::test]
    async fn unreachable_postgres_classifies_without_leaking() {
        let mut t = target();
        t.host = "127.0.0.1".to_string();
        t.port = 1;
        let err = PostgresConnector.inspect(&t).await.unwrap_err();
        assert!(!err.to_string().contains("s3cret"));
    }
}
