//! Local SQLite table of scheduled posts

use async_trait::async_trait;
use autopost_domain::{Item, ItemStatus, Schedule, SourceError, TableStore};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;

/// A row to append to the table
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub schedule: Schedule,
    pub text: Option<String>,
    pub title: Option<String>,
    pub image_url: Option<String>,
}

/// SQLite-backed table store; item ids are row ids
pub struct SqliteTableStore {
    pool: SqlitePool,
}

type PostRow = (
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

impl SqliteTableStore {
    /// Open the table, creating the database if needed
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SourceError::Storage(format!("Failed to create directory: {}", e)))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| SourceError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory table (for testing)
    pub async fn in_memory() -> Result<Self, SourceError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| SourceError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), SourceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                schedule TEXT NOT NULL DEFAULT '',
                text TEXT,
                title TEXT,
                image_url TEXT,
                status TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SourceError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Append a pending row. Returns its id.
    pub async fn add(&self, post: &NewPost) -> Result<String, SourceError> {
        let result = sqlx::query(
            r#"
            INSERT INTO posts (schedule, text, title, image_url, status)
            VALUES (?, ?, ?, ?, '')
            "#,
        )
        .bind(post.schedule.to_cell())
        .bind(&post.text)
        .bind(&post.title)
        .bind(&post.image_url)
        .execute(&self.pool)
        .await
        .map_err(|e| SourceError::Storage(e.to_string()))?;

        Ok(result.last_insert_rowid().to_string())
    }

    fn row_to_item(row: PostRow) -> Item {
        let (id, schedule, text, title, image_url, status) = row;
        Item {
            id: id.to_string(),
            schedule: Schedule::parse(&schedule),
            text,
            title,
            image_url,
            status: ItemStatus::decode(&status),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TableStore for SqliteTableStore {
    async fn read_items(&self) -> Result<Vec<Item>, SourceError> {
        let rows: Vec<PostRow> = sqlx::query_as(
            "SELECT id, schedule, text, title, image_url, status FROM posts ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SourceError::Storage(e.to_string()))?;

        Ok(rows.into_iter().map(Self::row_to_item).collect())
    }

    async fn write_status(&self, item_id: &str, status: &ItemStatus) -> Result<(), SourceError> {
        let id: i64 = item_id
            .parse()
            .map_err(|_| SourceError::Parse(format!("Not a row id: {}", item_id)))?;

        let result = sqlx::query("UPDATE posts SET status = ? WHERE id = ?")
            .bind(status.encode())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SourceError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SourceError::Storage(format!("No row with id {}", item_id)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn test_add_and_read() {
        let store = SqliteTableStore::in_memory().await.unwrap();

        let id = store
            .add(&NewPost {
                schedule: Schedule::At(datetime!(2024-01-01 09:00 UTC)),
                text: Some("Rates are up".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let items = store.read_items().await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].schedule, Schedule::At(datetime!(2024-01-01 09:00 UTC)));
        assert_eq!(items[0].text.as_deref(), Some("Rates are up"));
        assert!(items[0].status.is_pending());
    }

    #[tokio::test]
    async fn test_write_status_is_read_back() {
        let store = SqliteTableStore::in_memory().await.unwrap();
        let id = store.add(&NewPost::default()).await.unwrap();

        store
            .write_status(&id, &ItemStatus::failed("chat not found"))
            .await
            .unwrap();

        let items = store.read_items().await.unwrap();
        assert_eq!(items[0].status, ItemStatus::failed("chat not found"));
    }

    #[tokio::test]
    async fn test_write_status_unknown_row() {
        let store = SqliteTableStore::in_memory().await.unwrap();

        let result = store.write_status("42", &ItemStatus::Pending).await;

        assert!(matches!(result, Err(SourceError::Storage(_))));
    }

    #[tokio::test]
    async fn test_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.db");

        {
            let store = SqliteTableStore::new(&path).await.unwrap();
            store
                .add(&NewPost {
                    title: Some("Gold".to_string()),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let store = SqliteTableStore::new(&path).await.unwrap();
        let items = store.read_items().await.unwrap();
        assert_eq!(items[0].title.as_deref(), Some("Gold"));
    }
}
