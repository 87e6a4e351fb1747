use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::queue::classifier::ErrorKind;

/// Events that describe changes in the download queue state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A new item was admitted, or a failed/cancelled one re-admitted
    ItemAdded {
        id: String,
        video_id: String,
        timestamp: DateTime<Utc>,
    },
    /// An item took a slot and its download started
    ItemStarted {
        id: String,
        timestamp: DateTime<Utc>,
    },
    /// Download progress moved forward
    Progress { id: String, percent: u8 },
    /// An item finished downloading
    ItemCompleted {
        id: String,
        file_path: PathBuf,
        timestamp: DateTime<Utc>,
    },
    /// An item failed; `retryable` means an automatic retry is pending
    ItemFailed {
        id: String,
        error: String,
        kind: ErrorKind,
        retryable: bool,
        timestamp: DateTime<Utc>,
    },
    /// An automatic retry was scheduled
    RetryScheduled {
        id: String,
        attempt: u32,
        delay_ms: u64,
    },
    ItemPaused {
        id: String,
        timestamp: DateTime<Utc>,
    },
    /// A paused or failed item went back to `queued`
    ItemResumed {
        id: String,
        timestamp: DateTime<Utc>,
    },
    ItemCancelled {
        id: String,
        timestamp: DateTime<Utc>,
    },
    /// Completed items beyond the retention cap were archived
    ItemsArchived { count: usize },
    SchedulerStarted,
    SchedulerStopped,
}

impl QueueEvent {
    /// Id of the item this event is about, if any
    pub fn item_id(&self) -> Option<&str> {
        match self {
            QueueEvent::ItemAdded { id, .. }
            | QueueEvent::ItemStarted { id, .. }
            | QueueEvent::Progress { id, .. }
            | QueueEvent::ItemCompleted { id, .. }
            | QueueEvent::ItemFailed { id, .. }
            | QueueEvent::RetryScheduled { id, .. }
            | QueueEvent::ItemPaused { id, .. }
            | QueueEvent::ItemResumed { id, .. }
            | QueueEvent::ItemCancelled { id, .. } => Some(id),
            QueueEvent::ItemsArchived { .. }
            | QueueEvent::SchedulerStarted
            | QueueEvent::SchedulerStopped => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = QueueEvent::Progress {
            id: "abc".into(),
            percent: 42,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["percent"], 42);

        let back: QueueEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_item_id() {
        assert_eq!(
            QueueEvent::ItemPaused {
                id: "x".into(),
                timestamp: Utc::now()
            }
            .item_id(),
            Some("x")
        );
        assert_eq!(QueueEvent::SchedulerStopped.item_id(), None);
    }
}
