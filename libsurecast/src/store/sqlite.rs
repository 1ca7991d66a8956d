//! SQLite backings for the stores

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::{Result, StorageError};
use crate::store::{IdempotencyStore, PendingStore, MAX_ID_SUFFIX};
use crate::types::{Channel, PendingItem, PublishRecord};

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn record_from_row(row: &SqliteRow) -> Option<PublishRecord> {
    let channel = row.try_get::<String, _>("channel").ok()?.parse().ok()?;
    let published_at = parse_timestamp(&row.try_get::<String, _>("published_at").ok()?)?;
    Some(PublishRecord {
        channel,
        text: row.try_get("text").ok()?,
        content_hash: row.try_get("content_hash").ok()?,
        remote_id: row.try_get("remote_id").ok()?,
        published_at,
    })
}

fn pending_from_row(row: &SqliteRow) -> Option<PendingItem> {
    let channel = row.try_get::<String, _>("channel").ok()?.parse().ok()?;
    let created_at = parse_timestamp(&row.try_get::<String, _>("created_at").ok()?)?;
    Some(PendingItem {
        id: row.try_get("id").ok()?,
        channel,
        primary_text: row.try_get("primary_text").ok()?,
        reply_text: row.try_get("reply_text").ok()?,
        failure_reason: row.try_get("failure_reason").ok()?,
        created_at,
    })
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => db_error.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl IdempotencyStore for Database {
    async fn get_last(&self, channel: Channel) -> Option<PublishRecord> {
        let row = sqlx::query(
            r#"
            SELECT channel, text, content_hash, remote_id, published_at
            FROM publish_records WHERE channel = ?
            "#,
        )
        .bind(channel.as_str())
        .fetch_optional(&self.pool)
        .await;

        match row {
            Ok(Some(row)) => {
                let record = record_from_row(&row);
                if record.is_none() {
                    warn!("Ignoring unreadable publish record for {}", channel);
                }
                record.filter(|r| !r.remote_id.is_empty())
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Could not load publish record for {}: {}", channel, e);
                None
            }
        }
    }

    async fn set_last(&self, channel: Channel, record: &PublishRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO publish_records (channel, text, content_hash, remote_id, published_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(channel) DO UPDATE SET
                text = excluded.text,
                content_hash = excluded.content_hash,
                remote_id = excluded.remote_id,
                published_at = excluded.published_at
            "#,
        )
        .bind(channel.as_str())
        .bind(&record.text)
        .bind(&record.content_hash)
        .bind(&record.remote_id)
        .bind(record.published_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        debug!("Stored last {} post {}", channel, record.remote_id);
        Ok(())
    }
}

#[async_trait]
impl PendingStore for Database {
    async fn save(&self, item: &PendingItem) -> Result<String> {
        for n in 0..=MAX_ID_SUFFIX {
            let id = if n == 0 {
                item.id.clone()
            } else {
                format!("{}_{}", item.id, n)
            };

            let result = sqlx::query(
                r#"
                INSERT INTO pending_items (id, channel, primary_text, reply_text, failure_reason, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(item.channel.as_str())
            .bind(&item.primary_text)
            .bind(&item.reply_text)
            .bind(&item.failure_reason)
            .bind(item.created_at.to_rfc3339())
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => return Ok(format!("sqlite:pending_items/{}", id)),
                Err(e) if is_unique_violation(&e) => continue,
                Err(e) => return Err(StorageError::Sqlx(e).into()),
            }
        }

        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("no free pending id for {}", item.id),
        ))
        .into())
    }

    async fn list(&self) -> Result<Vec<PendingItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, channel, primary_text, reply_text, failure_reason, created_at
            FROM pending_items
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let item = pending_from_row(row);
                if item.is_none() {
                    warn!("Skipping unreadable pending row");
                }
                item
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Content;

    #[tokio::test]
    async fn test_record_roundtrip_and_overwrite() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.get_last(Channel::Twitter).await.is_none());

        let first = PublishRecord::new(Channel::Twitter, "Launch A", "42");
        db.set_last(Channel::Twitter, &first).await.unwrap();
        assert_eq!(db.get_last(Channel::Twitter).await, Some(first));

        let second = PublishRecord::new(Channel::Twitter, "Launch B", "43");
        db.set_last(Channel::Twitter, &second).await.unwrap();
        assert_eq!(db.get_last(Channel::Twitter).await, Some(second));
    }

    #[tokio::test]
    async fn test_corrupt_row_reads_as_none() {
        let db = Database::in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO publish_records (channel, text, content_hash, remote_id, published_at) VALUES ('twitter', 'a', 'h', '42', 'yesterday')",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        assert!(db.get_last(Channel::Twitter).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_remote_id_cannot_be_stored() {
        let db = Database::in_memory().await.unwrap();
        let record = PublishRecord::new(Channel::Twitter, "Launch A", "");
        assert!(db.set_last(Channel::Twitter, &record).await.is_err());
    }

    #[tokio::test]
    async fn test_pending_ids_are_never_reused() {
        let db = Database::in_memory().await.unwrap();
        let content = Content::new(Channel::LinkedIn, "Launch A", "");
        let item = PendingItem::from_content(&content, "422 Unprocessable");

        let first = db.save(&item).await.unwrap();
        let second = db.save(&item).await.unwrap();
        assert_eq!(first, format!("sqlite:pending_items/{}", item.id));
        assert_eq!(second, format!("sqlite:pending_items/{}_1", item.id));

        let items = db.list().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].failure_reason, "422 Unprocessable");
        assert_eq!(items[0].channel, Channel::LinkedIn);
    }
}
