use anyhow::Result;
use async_trait::async_trait;

use crate::queue::models::QueueItem;

/// Durable storage for queue rows.
///
/// The queue writes every transition through this trait before treating it as
/// committed, and reloads everything from it on startup.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert or replace the row for `item.id`
    async fn save_item(&self, item: &QueueItem) -> Result<()>;

    async fn get_item(&self, id: &str) -> Result<Option<QueueItem>>;

    /// Every row, including archived ones
    async fn load_items(&self) -> Result<Vec<QueueItem>>;
}
