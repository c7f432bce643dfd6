//! SQLite seen store implementation

use async_trait::async_trait;
use autopost_domain::{SeenStore, StateError};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use time::OffsetDateTime;

/// SQLite-backed seen store; survives restarts
pub struct SqliteSeenStore {
    pool: SqlitePool,
}

impl SqliteSeenStore {
    /// Create a new SQLite seen store, initializing the database if needed
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StateError> {
        let db_path = db_path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StateError::Database(format!("Failed to create directory: {}", e)))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| StateError::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub async fn in_memory() -> Result<Self, StateError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StateError::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StateError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_items (
                id TEXT PRIMARY KEY,
                seen_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateError::Database(e.to_string()))?;

        Ok(())
    }

    /// Forget identifiers last sighted before `cutoff`. Returns how many were removed.
    pub async fn prune_before(&self, cutoff: OffsetDateTime) -> Result<u64, StateError> {
        let result = sqlx::query("DELETE FROM seen_items WHERE seen_at < ?")
            .bind(cutoff.unix_timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| StateError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SeenStore for SqliteSeenStore {
    async fn is_seen(&self, id: &str) -> Result<bool, StateError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM seen_items WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StateError::Database(e.to_string()))?;

        Ok(count.0 > 0)
    }

    async fn mark_seen(&self, id: &str) -> Result<bool, StateError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO seen_items (id, seen_at)
            VALUES (?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StateError::Database(e.to_string()))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Repeat sighting: refresh so pruning only drops ids gone from their feed
        sqlx::query("UPDATE seen_items SET seen_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StateError::Database(e.to_string()))?;

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_seen_roundtrip() {
        let store = SqliteSeenStore::in_memory().await.unwrap();

        assert!(!store.is_seen("guid-1").await.unwrap());
        assert!(store.mark_seen("guid-1").await.unwrap());
        assert!(!store.mark_seen("guid-1").await.unwrap());
        assert!(store.is_seen("guid-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("seen.db");

        {
            let store = SqliteSeenStore::new(&path).await.unwrap();
            store.mark_seen("guid-1").await.unwrap();
        }

        let store = SqliteSeenStore::new(&path).await.unwrap();
        assert!(store.is_seen("guid-1").await.unwrap());
        assert!(!store.mark_seen("guid-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_before() {
        let store = SqliteSeenStore::in_memory().await.unwrap();
        store.mark_seen("old").await.unwrap();

        let removed = store
            .prune_before(OffsetDateTime::now_utc() + time::Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(!store.is_seen("old").await.unwrap());
    }

    #[tokio::test]
    async fn test_repeat_sighting_survives_prune() {
        let store = SqliteSeenStore::in_memory().await.unwrap();
        let long_ago = (OffsetDateTime::now_utc() - time::Duration::days(10)).unix_timestamp();

        store.mark_seen("still-listed").await.unwrap();
        store.mark_seen("gone").await.unwrap();
        sqlx::query("UPDATE seen_items SET seen_at = ?")
            .bind(long_ago)
            .execute(&store.pool)
            .await
            .unwrap();

        // Sighted again: not new, but the timestamp moves forward
        assert!(!store.mark_seen("still-listed").await.unwrap());

        let removed = store
            .prune_before(OffsetDateTime::now_utc() - time::Duration::days(3))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.is_seen("still-listed").await.unwrap());
        assert!(!store.is_seen("gone").await.unwrap());
    }
}
