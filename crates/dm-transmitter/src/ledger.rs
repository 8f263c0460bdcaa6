// SPDX-License-Identifier: MIT OR Apache-2.0
//! The batch ledger: a relational record of every batch's lifecycle.
//!
//! Status transitions are strictly `pending → sending → success|failed`;
//! every transition is a single-statement update keyed by batch id.

use async_trait::async_trait;
use chrono::Utc;
use dm_error::{ErrorCode, MeshError};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

/// Ledger counters surfaced on `/api/v1/stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Batches created but not yet sending.
    pub pending: i64,
    /// Batches currently in flight.
    pub sending: i64,
    /// Batches accepted by the destination.
    pub success: i64,
    /// Batches that terminally failed.
    pub failed: i64,
}

/// Storage seam for the batch ledger.
#[async_trait]
pub trait BatchLedger: Send + Sync {
    /// Insert a `pending` row and return its id.
    async fn create_batch(
        &self,
        item_count: usize,
        payload_size: usize,
        destination_url: &str,
    ) -> Result<Uuid, MeshError>;

    /// Flip the row to `sending` and stamp `sent_at`.
    async fn mark_sending(&self, batch_id: Uuid) -> Result<(), MeshError>;

    /// Flip the row to `success` with the HTTP status and completion time.
    async fn mark_success(&self, batch_id: Uuid, http_status: u16) -> Result<(), MeshError>;

    /// Flip the row to `failed` with status, error, and retry count.
    async fn mark_failure(
        &self,
        batch_id: Uuid,
        http_status: Option<u16>,
        error_message: &str,
        retry_count: u32,
    ) -> Result<(), MeshError>;

    /// Current per-status counts.
    async fn stats(&self) -> Result<LedgerStats, MeshError>;

    /// Whether the backing store answers a trivial query.
    async fn is_healthy(&self) -> bool;
}

/// PostgreSQL-backed ledger (`transmitter.batches`).
pub struct PgLedger {
    pool: PgPool,
}

fn db_err(e: sqlx::Error) -> MeshError {
    MeshError::new(ErrorCode::LedgerUnavailable, e.to_string())
}

impl PgLedger {
    /// Connect a pool to the ledger database.
    pub async fn connect(database_url: &str) -> Result<Self, MeshError> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        Ok(Self { pool })
    }

    /// Create the schema, table, and indexes if absent.
    pub async fn migrate(&self) -> Result<(), MeshError> {
        sqlx::query("CREATE SCHEMA IF NOT EXISTS transmitter")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transmitter.batches (
                id UUID PRIMARY KEY,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                item_count INTEGER NOT NULL,
                payload_size INTEGER NOT NULL,
                destination_url TEXT NOT NULL,
                http_status INTEGER,
                error_message TEXT,
                retry_count INTEGER DEFAULT 0,
                created_at TIMESTAMPTZ DEFAULT NOW(),
                sent_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_batches_status ON transmitter.batches(status)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_batches_created_at ON transmitter.batches(created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        info!("ledger migrations completed");
        Ok(())
    }
}

#[async_trait]
impl BatchLedger for PgLedger {
    async fn create_batch(
        &self,
        item_count: usize,
        payload_size: usize,
        destination_url: &str,
    ) -> Result<Uuid, MeshError> {
        let batch_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO transmitter.batches
            (id, item_count, payload_size, destination_url, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(batch_id)
        .bind(item_count as i32)
        .bind(payload_size as i32)
        .bind(destination_url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(batch_id)
    }

    async fn mark_sending(&self, batch_id: Uuid) -> Result<(), MeshError> {
        sqlx::query(
            "UPDATE transmitter.batches SET status = 'sending', sent_at = $2 WHERE id = $1",
        )
        .bind(batch_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn mark_success(&self, batch_id: Uuid, http_status: u16) -> Result<(), MeshError> {
        sqlx::query(
            r#"
            UPDATE transmitter.batches
            SET status = 'success', http_status = $2, completed_at = $3
            WHERE id = $1
            "#,
        )
        .bind(batch_id)
        .bind(http_status as i32)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn mark_failure(
        &self,
        batch_id: Uuid,
        http_status: Option<u16>,
        error_message: &str,
        retry_count: u32,
    ) -> Result<(), MeshError> {
        sqlx::query(
            r#"
            UPDATE transmitter.batches
            SET status = 'failed', http_status = $2, error_message = $3,
                retry_count = $4, completed_at = $5
            WHERE id = $1
            "#,
        )
        .bind(batch_id)
        .bind(http_status.map(|s| s as i32))
        .bind(error_message)
        .bind(retry_count as i32)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn stats(&self) -> Result<LedgerStats, MeshError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'sending') AS sending,
                COUNT(*) FILTER (WHERE status = 'success') AS success,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM transmitter.batches
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(LedgerStats {
            pending: row.get("pending"),
            sending: row.get("sending"),
            success: row.get("success"),
            failed: row.get("failed"),
        })
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
