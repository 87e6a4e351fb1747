//! In-memory queue store for embedding and tests

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::database::traits::QueueStore;
use crate::queue::models::QueueItem;
use crate::utils::error::TubeloaderError;

/// Non-durable [`QueueStore`]. Writes can be made to fail to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, QueueItem>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, as if rows were left by a previous process
    pub fn with_items(items: Vec<QueueItem>) -> Self {
        let rows = items.into_iter().map(|item| (item.id.clone(), item)).collect();
        Self {
            rows: Mutex::new(rows),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn save_item(&self, item: &QueueItem) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TubeloaderError::PersistenceError("store unavailable".into()).into());
        }

        let mut rows = self.rows.lock().await;
        // Same unique constraint as the SQLite table
        rows.retain(|id, row| row.video_id != item.video_id || *id == item.id);
        rows.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_item(&self, id: &str) -> Result<Option<QueueItem>> {
        Ok(self.rows.lock().await.get(id).cloned())
    }

    async fn load_items(&self) -> Result<Vec<QueueItem>> {
        let mut items: Vec<QueueItem> = self.rows.lock().await.values().cloned().collect();
        items.sort_by(|a, b| a.added_at.cmp(&b.added_at));
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_video_id_stays_unique() {
        let store = MemoryStore::new();
        let first = QueueItem::new("https://youtu.be/dQw4w9WgXcQ", "dQw4w9WgXcQ", 0, "mp4", "best", 3);
        let second = QueueItem::new("https://youtu.be/dQw4w9WgXcQ", "dQw4w9WgXcQ", 0, "mp4", "best", 3);

        store.save_item(&first).await.unwrap();
        store.save_item(&second).await.unwrap();

        let items = store.load_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, second.id);
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let item = QueueItem::new("https://youtu.be/dQw4w9WgXcQ", "dQw4w9WgXcQ", 0, "mp4", "best", 3);

        assert!(store.save_item(&item).await.is_err());
        assert!(store.load_items().await.unwrap().is_empty());

        store.set_fail_writes(false);
        store.save_item(&item).await.unwrap();
        assert_eq!(store.get_item(&item.id).await.unwrap(), Some(item));
    }
}
