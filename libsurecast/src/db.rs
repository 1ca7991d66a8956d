//! SQLite database for Surecast
//!
//! Holds the SQLite backings of the idempotency and pending stores. The
//! store traits are implemented in [`crate::store::sqlite`].

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

use crate::error::{Result, StorageError};

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }

        // mode=rwc creates the file on first use
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(StorageError::Sqlx)?;

        Self::migrate(pool).await
    }

    /// Open a private in-memory database
    ///
    /// Every SQLite connection to `:memory:` sees its own database, so the
    /// pool is pinned to one connection that never expires.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(StorageError::Sqlx)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StorageError::Migration)?;

        Ok(Self { pool })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_new_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("surecast.db");

        Database::new(db_path.to_str().unwrap()).await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let db = Database::in_memory().await.unwrap();

        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('publish_records', 'pending_items') ORDER BY name",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap();

        let names: Vec<String> = rows.iter().map(|r| r.get("name")).collect();
        assert_eq!(names, vec!["pending_items", "publish_records"]);
    }

    #[tokio::test]
    async fn test_empty_remote_id_is_rejected_by_schema() {
        let db = Database::in_memory().await.unwrap();

        let result = sqlx::query(
            "INSERT INTO publish_records (channel, text, content_hash, remote_id, published_at) VALUES ('twitter', 'a', 'h', '', '2025-01-01T00:00:00Z')",
        )
        .execute(&db.pool)
        .await;

        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_path_is_an_error() {
        let result = Database::new("/tmp/surecast\0invalid.db").await;
        assert!(result.is_err());
    }
}
