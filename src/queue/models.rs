//! Queue item model and the result shapes returned to callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::queue::classifier::ErrorKind;
use crate::utils::error::TubeloaderError;

/// Lifecycle state of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    #[default]
    Pending,
    Queued,
    Downloading,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Queued => "queued",
            QueueStatus::Downloading => "downloading",
            QueueStatus::Paused => "paused",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
            QueueStatus::Cancelled => "cancelled",
        }
    }

    /// Live items count against the queue size limit and block re-admission
    /// of the same video.
    pub fn is_live(&self) -> bool {
        !matches!(self, QueueStatus::Completed | QueueStatus::Cancelled)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = TubeloaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "queued" => Ok(QueueStatus::Queued),
            "downloading" => Ok(QueueStatus::Downloading),
            "paused" => Ok(QueueStatus::Paused),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            "cancelled" => Ok(QueueStatus::Cancelled),
            other => Err(TubeloaderError::OperationFailed(format!(
                "unknown queue status '{}'",
                other
            ))),
        }
    }
}

/// One tracked download, keyed by the source video id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub url: String,
    pub video_id: String,
    pub title: Option<String>,
    pub channel_title: Option<String>,
    pub thumbnail_ref: Option<String>,
    pub status: QueueStatus,
    pub progress: u8,
    pub priority: i32,
    pub format: String,
    pub quality: String,
    pub file_path: Option<PathBuf>,
    pub file_size_bytes: Option<u64>,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub is_retryable: bool,
    pub retry_count: u32,
    pub max_retries: u32,
    pub added_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// Create a new item in the `pending` state
    pub fn new(
        url: &str,
        video_id: &str,
        priority: i32,
        format: &str,
        quality: &str,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.to_string(),
            video_id: video_id.to_string(),
            title: None,
            channel_title: None,
            thumbnail_ref: None,
            status: QueueStatus::Pending,
            progress: 0,
            priority,
            format: format.to_string(),
            quality: quality.to_string(),
            file_path: None,
            file_size_bytes: None,
            error_message: None,
            error_kind: None,
            is_retryable: false,
            retry_count: 0,
            max_retries,
            added_at: now,
            started_at: None,
            paused_at: None,
            completed_at: None,
            cancelled_at: None,
            updated_at: now,
            archived_at: None,
        }
    }

    /// Move into `queued`, dropping everything left over from a previous attempt.
    /// `retry_count` is kept: only automatic retries change it.
    pub fn requeue(&mut self) {
        self.status = QueueStatus::Queued;
        self.progress = 0;
        self.paused_at = None;
        self.started_at = None;
        self.error_message = None;
        self.error_kind = None;
        self.is_retryable = false;
        self.file_path = None;
        self.file_size_bytes = None;
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// Options for `add_to_queue`; unset fields fall back to the configured defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOptions {
    pub priority: Option<i32>,
    pub format: Option<String>,
    pub quality: Option<String>,
}

/// Why a URL was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    InvalidUrl,
    Duplicate,
    BatchLimit,
    QueueFull,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::InvalidUrl => "invalid-url",
            SkipReason::Duplicate => "duplicate",
            SkipReason::BatchLimit => "batch-limit",
            SkipReason::QueueFull => "queue-full",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedUrl {
    pub url: String,
    pub reason: SkipReason,
}

/// Result of `add_to_queue`: partial success is reported, never raised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOutcome {
    pub success: bool,
    pub download_ids: Vec<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub skipped_urls: Vec<SkippedUrl>,
}

impl AddOutcome {
    pub fn new(download_ids: Vec<String>, skipped_urls: Vec<SkippedUrl>) -> Self {
        let message = match (download_ids.len(), skipped_urls.len()) {
            (0, 0) => "No URLs provided".to_string(),
            (0, skipped) => format!("No downloads added, {} skipped", skipped),
            (added, 0) => format!("Added {} download(s) to the queue", added),
            (added, skipped) => format!(
                "Added {} download(s) to the queue, {} skipped",
                added, skipped
            ),
        };
        Self {
            success: !download_ids.is_empty(),
            download_ids,
            message,
            skipped_urls,
        }
    }
}

/// Result of the single-item commands and queue toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
}

impl CommandOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total_active: usize,
    pub total_queued: usize,
    pub total_completed: usize,
    pub total_failed: usize,
}

/// Point-in-time copy of the queue, bucketed by status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub downloading: Vec<QueueItem>,
    pub queued: Vec<QueueItem>,
    pub paused: Vec<QueueItem>,
    pub failed: Vec<QueueItem>,
    pub completed: Vec<QueueItem>,
    pub stats: QueueStats,
}

impl QueueSnapshot {
    /// Find an item in any bucket
    pub fn find(&self, id: &str) -> Option<&QueueItem> {
        self.downloading
            .iter()
            .chain(&self.queued)
            .chain(&self.paused)
            .chain(&self.failed)
            .chain(&self.completed)
            .find(|item| item.id == id)
    }
}
