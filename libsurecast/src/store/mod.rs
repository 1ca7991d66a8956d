//! Durable stores behind narrow interfaces
//!
//! [`IdempotencyStore`] remembers the last published primary post per
//! channel. [`PendingStore`] keeps content that could not be published so an
//! operator can retry it by hand. Both have a JSON-file backing and a SQLite
//! backing, chosen by `[storage] backend`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};
use crate::db::Database;
use crate::error::Result;
use crate::types::{Channel, PendingItem, PublishRecord};

pub mod file;
pub mod sqlite;

pub use file::{FilePendingStore, JsonFileStore};

/// Last successfully published item per channel
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// The last record for `channel`
    ///
    /// A missing or unreadable backing yields `None`; read failures are
    /// logged, never returned.
    async fn get_last(&self, channel: Channel) -> Option<PublishRecord>;

    /// Replace the record for `channel`
    async fn set_last(&self, channel: Channel, record: &PublishRecord) -> Result<()>;
}

/// Write-once storage for content awaiting manual recovery
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Persist a new item and return where it was written
    ///
    /// Existing items are never overwritten. If the item's id is already
    /// taken, a numeric suffix is appended to make it unique.
    async fn save(&self, item: &PendingItem) -> Result<String>;

    /// All pending items, oldest first
    async fn list(&self) -> Result<Vec<PendingItem>>;
}

/// Upper bound on suffixes tried when a pending id is already taken
pub(crate) const MAX_ID_SUFFIX: u32 = 100;

/// Both stores, opened from configuration
pub struct Stores {
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub pending: Arc<dyn PendingStore>,
}

/// Open the stores selected by `config.backend`
pub async fn open(config: &StorageConfig) -> Result<Stores> {
    match config.backend {
        StorageBackend::File => {
            let dir = config.expand_data_dir();
            info!("Using file storage in {}", dir.display());
            Ok(Stores {
                idempotency: Arc::new(JsonFileStore::new(&dir)),
                pending: Arc::new(FilePendingStore::new(dir.join("pending"))),
            })
        }
        StorageBackend::Sqlite => {
            let path = config.expand_database_path();
            info!("Using SQLite storage at {}", path);
            let db = Arc::new(Database::new(&path).await?);
            Ok(Stores {
                idempotency: db.clone(),
                pending: db,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_file_backend() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            backend: StorageBackend::File,
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            database: String::new(),
        };

        let stores = open(&config).await.unwrap();
        let record = PublishRecord::new(Channel::Twitter, "Launch A", "42");
        stores
            .idempotency
            .set_last(Channel::Twitter, &record)
            .await
            .unwrap();

        assert!(temp_dir.path().join("last_post_twitter.json").exists());
        assert_eq!(stores.idempotency.get_last(Channel::Twitter).await, Some(record));
    }

    #[tokio::test]
    async fn test_open_sqlite_backend() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("surecast.db");
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            data_dir: String::new(),
            database: db_path.to_string_lossy().to_string(),
        };

        let stores = open(&config).await.unwrap();
        assert!(stores.idempotency.get_last(Channel::LinkedIn).await.is_none());
        assert!(stores.pending.list().await.unwrap().is_empty());
        assert!(db_path.exists());
    }
}
