//! PostgreSQL database operations

use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::{ContentRecord, Device, Snapshot, SyncRecord};

/// Database wrapper with connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL and create connection pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ApiError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // === Device Repository ===

    /// Create a new device with generated token
    pub async fn create_device(&self, name: Option<&str>) -> Result<Device> {
        let token = Uuid::new_v4().to_string();
        let device = sqlx::query_as::<_, Device>(
            r#"
            INSERT INTO devices (token, name)
            VALUES ($1, $2)
            RETURNING id, token, name, created_at, last_seen_at
            "#,
        )
        .bind(&token)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(device)
    }

    /// Get device by token
    pub async fn get_device_by_token(&self, token: &str) -> Result<Option<Device>> {
        let device = sqlx::query_as::<_, Device>(
            r#"
            SELECT id, token, name, created_at, last_seen_at
            FROM devices
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(device)
    }

    /// Update device last_seen_at timestamp
    pub async fn update_last_seen(&self, device_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE devices
            SET last_seen_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(device_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // === Snapshot Repository ===

    /// Get the stored snapshot for a device, if any
    pub async fn get_snapshot(&self, device_id: Uuid) -> Result<Option<SyncRecord>> {
        let row = sqlx::query(
            r#"
            SELECT payload, updated_at
            FROM library_snapshots
            WHERE device_id = $1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: Value = row.get("payload");
        let snapshot: Snapshot = serde_json::from_value(payload)
            .map_err(|e| ApiError::Internal(format!("corrupt stored snapshot: {e}")))?;
        Ok(Some(SyncRecord {
            snapshot,
            updated_at: row.get("updated_at"),
        }))
    }

    /// Upsert the device's snapshot.
    ///
    /// The incoming records map is unioned with the stored one (incoming
    /// wins per key) and the explicitly removed keys are pruned, so a
    /// client that evicted payloads locally never deletes the stored
    /// copy by omission. All other collections are replaced wholesale.
    pub async fn upsert_snapshot(
        &self,
        device_id: Uuid,
        incoming: Snapshot,
        removed_record_keys: &[String],
        updated_at: i64,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            r#"
            SELECT payload, updated_at
            FROM library_snapshots
            WHERE device_id = $1
            FOR UPDATE
            "#,
        )
        .bind(device_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (merged, stored_at) = match existing {
            Some(row) => {
                let payload: Value = row.get("payload");
                let stored: Snapshot = serde_json::from_value(payload)
                    .map_err(|e| ApiError::Internal(format!("corrupt stored snapshot: {e}")))?;
                let previous_at: i64 = row.get("updated_at");
                (
                    union_push(stored, incoming, removed_record_keys),
                    updated_at.max(previous_at),
                )
            }
            None => {
                let mut snapshot = incoming;
                for key in removed_record_keys {
                    snapshot.records.remove(key);
                }
                (snapshot, updated_at)
            }
        };

        let payload = serde_json::to_value(&merged)
            .map_err(|e| ApiError::Internal(format!("snapshot serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO library_snapshots (device_id, payload, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (device_id)
            DO UPDATE SET payload = $2, updated_at = $3
            "#,
        )
        .bind(device_id)
        .bind(&payload)
        .bind(stored_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored_at)
    }

    /// Keys of the content records the store currently holds for a device
    pub async fn record_keys(&self, device_id: Uuid) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT jsonb_object_keys(payload -> 'records') AS key
            FROM library_snapshots
            WHERE device_id = $1
            "#,
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("key")).collect())
    }

    /// Fetch one stored content record by key
    pub async fn get_record(&self, device_id: Uuid, key: &str) -> Result<Option<ContentRecord>> {
        let row = sqlx::query(
            r#"
            SELECT payload -> 'records' -> $2 AS record
            FROM library_snapshots
            WHERE device_id = $1
            "#,
        )
        .bind(device_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let record: Option<Value> = row.get("record");
        match record {
            Some(value) => {
                let record = serde_json::from_value(value)
                    .map_err(|e| ApiError::Internal(format!("corrupt stored record: {e}")))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}

/// Apply push semantics: replace every collection except `records`,
/// which unions per key with the incoming side winning, then prune the
/// explicitly removed keys.
fn union_push(stored: Snapshot, mut incoming: Snapshot, removed_record_keys: &[String]) -> Snapshot {
    for (key, record) in stored.records {
        incoming.records.entry(key).or_insert(record);
    }
    for key in removed_record_keys {
        incoming.records.remove(key);
    }
    incoming
}
