//! In-memory view of the persisted queue

use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::database::traits::QueueStore;
use crate::queue::models::{QueueItem, QueueSnapshot, QueueStats, QueueStatus};

/// All queue rows, indexed by id and by video id.
///
/// Owned by the queue actor; everyone else sees copies through [`QueueState::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct QueueState {
    items: HashMap<String, QueueItem>,
    by_video: HashMap<String, String>,
}

impl QueueState {
    pub fn from_items(items: Vec<QueueItem>) -> Self {
        let mut state = Self::default();
        for item in items {
            state.upsert(item);
        }
        state
    }

    /// Read every persisted row as-is, without repairing interrupted downloads
    pub async fn load(store: &dyn QueueStore) -> Result<Self> {
        let items = store
            .load_items()
            .await
            .context("Failed to load persisted queue")?;
        Ok(Self::from_items(items))
    }

    pub fn get(&self, id: &str) -> Option<&QueueItem> {
        self.items.get(id)
    }

    pub fn find_by_video_id(&self, video_id: &str) -> Option<&QueueItem> {
        self.by_video
            .get(video_id)
            .and_then(|id| self.items.get(id))
    }

    pub fn upsert(&mut self, item: QueueItem) {
        self.by_video.insert(item.video_id.clone(), item.id.clone());
        self.items.insert(item.id.clone(), item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.values()
    }

    pub fn count(&self, status: QueueStatus) -> usize {
        self.items.values().filter(|item| item.status == status).count()
    }

    pub fn live_count(&self) -> usize {
        self.items.values().filter(|item| item.status.is_live()).count()
    }

    /// Queued items in scheduling order
    pub fn queued_in_order(&self) -> Vec<&QueueItem> {
        let mut queued: Vec<&QueueItem> = self
            .items
            .values()
            .filter(|item| item.status == QueueStatus::Queued)
            .collect();
        queued.sort_by(|a, b| schedule_order(a, b));
        queued
    }

    /// Completed items still shown in the queue view, newest first
    pub fn visible_completed(&self) -> Vec<&QueueItem> {
        let mut completed: Vec<&QueueItem> = self
            .items
            .values()
            .filter(|item| item.status == QueueStatus::Completed && !item.is_archived())
            .collect();
        completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then_with(|| a.id.cmp(&b.id)));
        completed
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let mut snapshot = QueueSnapshot {
            queued: self.queued_in_order().into_iter().cloned().collect(),
            completed: self.visible_completed().into_iter().cloned().collect(),
            ..Default::default()
        };

        for item in self.items.values() {
            match item.status {
                QueueStatus::Downloading => snapshot.downloading.push(item.clone()),
                QueueStatus::Paused => snapshot.paused.push(item.clone()),
                QueueStatus::Failed => snapshot.failed.push(item.clone()),
                _ => {}
            }
        }

        snapshot
            .downloading
            .sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
        snapshot
            .paused
            .sort_by(|a, b| b.paused_at.cmp(&a.paused_at).then_with(|| a.id.cmp(&b.id)));
        snapshot
            .failed
            .sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));

        snapshot.stats = QueueStats {
            total_active: snapshot.downloading.len(),
            total_queued: snapshot.queued.len(),
            total_completed: snapshot.completed.len(),
            total_failed: snapshot.failed.len(),
        };
        snapshot
    }
}

/// Higher priority first, then FIFO by `added_at`, then by id so ties are stable
pub fn schedule_order(a: &QueueItem, b: &QueueItem) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.added_at.cmp(&b.added_at))
        .then_with(|| a.id.cmp(&b.id))
}
