//! Database CRUD operations

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use std::path::PathBuf;
use tracing::debug;

use crate::database::traits::QueueStore;
use crate::queue::classifier::ErrorKind;
use crate::queue::models::{QueueItem, QueueStatus};

/// SQLite-backed queue store
#[derive(Debug, Clone)]
pub struct DatabaseManager {
    pool: Pool<Sqlite>,
}

impl DatabaseManager {
    /// Create new database manager
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl QueueStore for DatabaseManager {
    async fn save_item(&self, item: &QueueItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO queue_items
            (id, url, video_id, title, channel_title, thumbnail_ref, status, progress, priority,
             format, quality, file_path, file_size_bytes, error_message, error_kind, is_retryable,
             retry_count, max_retries, added_at, started_at, paused_at, completed_at, cancelled_at,
             updated_at, archived_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.url)
        .bind(&item.video_id)
        .bind(&item.title)
        .bind(&item.channel_title)
        .bind(&item.thumbnail_ref)
        .bind(item.status.as_str())
        .bind(item.progress as i64)
        .bind(item.priority as i64)
        .bind(&item.format)
        .bind(&item.quality)
        .bind(item.file_path.as_ref().map(|p| p.to_string_lossy().into_owned()))
        .bind(item.file_size_bytes.map(|v| v as i64))
        .bind(&item.error_message)
        .bind(item.error_kind.map(|kind| kind.as_str()))
        .bind(item.is_retryable)
        .bind(item.retry_count as i64)
        .bind(item.max_retries as i64)
        .bind(item.added_at)
        .bind(item.started_at)
        .bind(item.paused_at)
        .bind(item.completed_at)
        .bind(item.cancelled_at)
        .bind(item.updated_at)
        .bind(item.archived_at)
        .execute(&self.pool)
        .await?;

        debug!("Saved queue item {} ({})", item.id, item.status);
        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<Option<QueueItem>> {
        let row = sqlx::query("SELECT * FROM queue_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_into_queue_item).transpose()
    }

    async fn load_items(&self) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query("SELECT * FROM queue_items ORDER BY added_at")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_into_queue_item).collect()
    }
}

/// Convert database row to queue item
fn row_into_queue_item(row: SqliteRow) -> Result<QueueItem> {
    let status: String = row.try_get("status")?;
    let error_kind: Option<String> = row.try_get("error_kind")?;

    Ok(QueueItem {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        video_id: row.try_get("video_id")?,
        title: row.try_get("title")?,
        channel_title: row.try_get("channel_title")?,
        thumbnail_ref: row.try_get("thumbnail_ref")?,
        status: status.parse::<QueueStatus>()?,
        progress: row.try_get::<i64, _>("progress")?.clamp(0, 100) as u8,
        priority: row.try_get::<i64, _>("priority")? as i32,
        format: row.try_get("format")?,
        quality: row.try_get("quality")?,
        file_path: row
            .try_get::<Option<String>, _>("file_path")?
            .map(PathBuf::from),
        file_size_bytes: row
            .try_get::<Option<i64>, _>("file_size_bytes")?
            .map(|v| v as u64),
        error_message: row.try_get("error_message")?,
        error_kind: error_kind
            .map(|kind| kind.parse::<ErrorKind>())
            .transpose()?,
        is_retryable: row.try_get("is_retryable")?,
        retry_count: row.try_get::<i64, _>("retry_count")? as u32,
        max_retries: row.try_get::<i64, _>("max_retries")? as u32,
        added_at: row.try_get("added_at")?,
        started_at: row.try_get("started_at")?,
        paused_at: row.try_get("paused_at")?,
        completed_at: row.try_get("completed_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        updated_at: row.try_get("updated_at")?,
        archived_at: row.try_get("archived_at")?,
    })
}
