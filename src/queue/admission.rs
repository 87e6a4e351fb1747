//! Admission control: URL validation, video id extraction and deduplication

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::queue::models::{QueueStatus, SkipReason};
use crate::queue::state::QueueState;
use crate::utils::config::AppSettings;
use crate::utils::error::TubeloaderError;

static VIDEO_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

/// Path prefixes on youtube.com that carry the id as the next segment
const ID_PATH_PREFIXES: [&str; 5] = ["shorts", "embed", "live", "v", "e"];

/// Extract the canonical 11-character video id from a watch, shorts, embed,
/// youtu.be or music URL.
pub fn extract_video_id(raw: &str) -> Result<String, TubeloaderError> {
    let trimmed = raw.trim();
    let invalid = || TubeloaderError::InvalidUrl(trimmed.to_string());

    if trimmed.is_empty() {
        return Err(invalid());
    }

    // Pasted links frequently lack a scheme
    let parsed = if trimmed.contains("://") {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("https://{}", trimmed))
    }
    .map_err(|_| invalid())?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }

    let host = parsed.host_str().ok_or_else(invalid)?.to_ascii_lowercase();
    let host = ["www.", "m.", "music."]
        .iter()
        .find_map(|prefix| host.strip_prefix(prefix))
        .unwrap_or(&host)
        .to_string();

    let mut segments = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect::<Vec<_>>())
        .unwrap_or_default()
        .into_iter();

    let candidate = match host.as_str() {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "youtube-nocookie.com" => match segments.next() {
            Some("watch") => parsed
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            Some(prefix) if ID_PATH_PREFIXES.contains(&prefix) => {
                segments.next().map(str::to_string)
            }
            _ => None,
        },
        _ => None,
    };

    match candidate {
        Some(id) if VIDEO_ID.is_match(&id) => Ok(id),
        _ => Err(invalid()),
    }
}

/// What admission decided for one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Create a new item for this video
    Insert { video_id: String },
    /// Re-queue the existing failed/cancelled item
    Requeue { id: String },
    Skip(SkipReason),
}

/// Validates and deduplicates incoming URLs against the current queue
#[derive(Debug, Clone)]
pub struct AdmissionController {
    max_batch_size: usize,
    max_queue_size: usize,
}

impl AdmissionController {
    pub fn new(max_batch_size: usize, max_queue_size: usize) -> Self {
        Self {
            max_batch_size,
            max_queue_size,
        }
    }

    pub fn from_settings(settings: &AppSettings) -> Self {
        Self::new(settings.max_batch_size, settings.max_queue_size)
    }

    /// Evaluate the URL at `position` (0-based) in a batch against `state`.
    ///
    /// Items admitted earlier in the same batch must already be in `state`, so
    /// repeats within a batch are reported as duplicates.
    pub fn evaluate(&self, raw_url: &str, position: usize, state: &QueueState) -> AdmissionDecision {
        if position >= self.max_batch_size {
            return AdmissionDecision::Skip(SkipReason::BatchLimit);
        }

        let video_id = match extract_video_id(raw_url) {
            Ok(id) => id,
            Err(_) => return AdmissionDecision::Skip(SkipReason::InvalidUrl),
        };

        let existing = state.find_by_video_id(&video_id);
        if let Some(item) = existing {
            if !matches!(item.status, QueueStatus::Failed | QueueStatus::Cancelled) {
                return AdmissionDecision::Skip(SkipReason::Duplicate);
            }
        }

        // A failed item is already live, so re-queueing it does not grow the queue
        let adds_live_item = existing.map_or(true, |item| !item.status.is_live());
        if adds_live_item && state.live_count() >= self.max_queue_size {
            return AdmissionDecision::Skip(SkipReason::QueueFull);
        }

        match existing {
            Some(item) => AdmissionDecision::Requeue {
                id: item.id.clone(),
            },
            None => AdmissionDecision::Insert { video_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::models::QueueItem;

    const ID: &str = "dQw4w9WgXcQ";

    #[test]
    fn test_extract_known_url_shapes() {
        let urls = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://music.youtube.com/watch?v=dQw4w9WgXcQ&list=RDAMVM",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?si=abc",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "youtube.com/watch?v=dQw4w9WgXcQ",
            "  https://youtu.be/dQw4w9WgXcQ  ",
        ];
        for url in urls {
            assert_eq!(extract_video_id(url).unwrap(), ID, "url: {}", url);
        }
    }

    #[test]
    fn test_reject_unknown_or_malformed_urls() {
        let urls = [
            "",
            "not a url",
            "https://vimeo.com/123456",
            "https://www.youtube.com/watch?v=short",
            "https://www.youtube.com/channel/UC1234567890",
            "ftp://youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/",
        ];
        for url in urls {
            assert!(extract_video_id(url).is_err(), "url: {}", url);
        }
    }

    fn state_with(status: QueueStatus) -> (QueueState, String) {
        let mut item = QueueItem::new("https://youtu.be/dQw4w9WgXcQ", ID, 0, "mp4", "best", 3);
        item.status = status;
        let id = item.id.clone();
        (QueueState::from_items(vec![item]), id)
    }

    #[test]
    fn test_new_video_is_inserted() {
        let controller = AdmissionController::new(100, 1000);
        assert_eq!(
            controller.evaluate("https://youtu.be/dQw4w9WgXcQ", 0, &QueueState::default()),
            AdmissionDecision::Insert {
                video_id: ID.to_string()
            }
        );
    }

    #[test]
    fn test_live_video_is_duplicate() {
        let controller = AdmissionController::new(100, 1000);
        for status in [
            QueueStatus::Queued,
            QueueStatus::Downloading,
            QueueStatus::Paused,
            QueueStatus::Completed,
        ] {
            let (state, _) = state_with(status);
            assert_eq!(
                controller.evaluate("https://www.youtube.com/watch?v=dQw4w9WgXcQ", 0, &state),
                AdmissionDecision::Skip(SkipReason::Duplicate)
            );
        }
    }

    #[test]
    fn test_failed_or_cancelled_video_is_requeued() {
        let controller = AdmissionController::new(100, 1000);
        for status in [QueueStatus::Failed, QueueStatus::Cancelled] {
            let (state, id) = state_with(status);
            assert_eq!(
                controller.evaluate("https://youtu.be/dQw4w9WgXcQ", 0, &state),
                AdmissionDecision::Requeue { id }
            );
        }
    }

    #[test]
    fn test_batch_and_queue_limits() {
        let controller = AdmissionController::new(2, 1);
        assert_eq!(
            controller.evaluate("https://youtu.be/dQw4w9WgXcQ", 2, &QueueState::default()),
            AdmissionDecision::Skip(SkipReason::BatchLimit)
        );

        let (state, _) = state_with(QueueStatus::Queued);
        assert_eq!(
            controller.evaluate("https://youtu.be/aaaaaaaaaaa", 0, &state),
            AdmissionDecision::Skip(SkipReason::QueueFull)
        );

        // Re-queueing a failed item does not need a free queue slot
        let (state, id) = state_with(QueueStatus::Failed);
        assert_eq!(
            controller.evaluate("https://youtu.be/dQw4w9WgXcQ", 0, &state),
            AdmissionDecision::Requeue { id }
        );
    }

    #[test]
    fn test_invalid_url_reported_before_limits() {
        let controller = AdmissionController::new(100, 0);
        assert_eq!(
            controller.evaluate("https://example.com", 0, &QueueState::default()),
            AdmissionDecision::Skip(SkipReason::InvalidUrl)
        );
    }
}
