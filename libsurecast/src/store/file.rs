//! JSON-file backings
//!
//! The idempotency record for each channel lives in
//! `<data_dir>/last_post_<channel>.json`. Pending items are one file each
//! under `<data_dir>/pending/`, named after the item id.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::{Result, StorageError};
use crate::store::{IdempotencyStore, PendingStore, MAX_ID_SUFFIX};
use crate::types::{Channel, PendingItem, PublishRecord};

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn record_path(&self, channel: Channel) -> PathBuf {
        self.dir.join(format!("last_post_{}.json", channel))
    }
}

#[async_trait]
impl IdempotencyStore for JsonFileStore {
    async fn get_last(&self, channel: Channel) -> Option<PublishRecord> {
        let path = self.record_path(channel);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<PublishRecord>(&content) {
            Ok(record) if record.remote_id.is_empty() => {
                warn!("Ignoring {} record without remote id", channel);
                None
            }
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring corrupt record {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn set_last(&self, channel: Channel, record: &PublishRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(StorageError::Io)?;

        let path = self.record_path(channel);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(record).map_err(StorageError::Serialization)?;

        // Readers see either the old record or the new one
        fs::write(&tmp_path, json).await.map_err(StorageError::Io)?;
        fs::rename(&tmp_path, &path).await.map_err(StorageError::Io)?;

        debug!("Stored last {} post {} in {}", channel, record.remote_id, path.display());
        Ok(())
    }
}

pub struct FilePendingStore {
    dir: PathBuf,
}

impl FilePendingStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl PendingStore for FilePendingStore {
    async fn save(&self, item: &PendingItem) -> Result<String> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(StorageError::Io)?;

        let mut item = item.clone();
        let base_id = item.id.clone();

        for n in 0..=MAX_ID_SUFFIX {
            if n > 0 {
                item.id = format!("{}_{}", base_id, n);
            }
            let path = self.dir.join(format!("{}.json", item.id));
            let json =
                serde_json::to_string_pretty(&item).map_err(StorageError::Serialization)?;

            let file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StorageError::Io(e).into()),
            };

            write_or_discard(file, &path, json.as_bytes())
                .await
                .map_err(StorageError::Io)?;

            return Ok(path.to_string_lossy().to_string());
        }

        Err(StorageError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free pending id for {}", base_id),
        ))
        .into())
    }

    async fn list(&self) -> Result<Vec<PendingItem>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e).into()),
        };

        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(StorageError::Io)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path).await.map_err(StorageError::Io)?;
            match serde_json::from_str::<PendingItem>(&content) {
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping unreadable pending file {}: {}", path.display(), e),
            }
        }

        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }
}

/// Write a freshly created file, removing it again if the write fails
async fn write_or_discard<W>(mut file: W, path: &Path, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = match file.write_all(bytes).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        drop(file);
        if let Err(remove_err) = fs::remove_file(path).await {
            warn!(
                "Could not remove partial pending file {}: {}",
                path.display(),
                remove_err
            );
        }
        return Err(e);
    }
    Ok(())
}
