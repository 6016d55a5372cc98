use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::object_store::ObjectStore;
use super::types::{validate_key, StoreError};

// ============================================================================
// SQLite Object Store
// ============================================================================

/// Object store backed by a single SQLite table keyed by `(bucket, key)`.
///
/// Every `put` is one `INSERT .. ON CONFLICT DO UPDATE` statement, which
/// SQLite applies atomically, so a whole episode index is replaced in one
/// step.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) a database and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database, used by tests.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: wait up to 5 seconds for a competing writer
        let options = SqliteConnectOptions::from_str(&url)?.pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store
            .migrate()
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(store)
    }

    /// Run schema migrations inside one transaction. Idempotent.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS objects (
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                body BLOB NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (bucket, key)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

impl ObjectStore for SqliteStore {
    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), StoreError> {
        validate_key(bucket)?;
        validate_key(key)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO objects (bucket, key, body, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(bucket, key) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(bucket)
        .bind(key)
        .bind(body)
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::debug!(bucket = bucket, key = key, bytes = body.len(), "put_object");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(bucket)?;
        validate_key(key)?;

        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT body FROM objects WHERE bucket = ? AND key = ?")
                .bind(bucket)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(body,)| body))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        validate_key(bucket)?;

        // Prefix filtering happens in Rust: LIKE would need escaping of % and _
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT key FROM objects WHERE bucket = ? ORDER BY key")
                .bind(bucket)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(key,)| key)
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        validate_key(bucket)?;
        validate_key(key)?;

        let result = sqlx::query("DELETE FROM objects WHERE bucket = ? AND key = ?")
            .bind(bucket)
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
