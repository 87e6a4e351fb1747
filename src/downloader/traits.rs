use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::extractor::models::VideoMetadata;

/// Everything a downloader needs to fetch one queue item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Queue item id
    pub id: String,
    pub url: String,
    pub video_id: String,
    pub format: String,
    pub quality: String,
    /// Directory the finished file should land in
    pub output_dir: PathBuf,
}

/// Non-terminal events emitted while a download runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Whole-percent progress, 0..=100
    Progress(u8),
    /// Descriptive metadata discovered for the video
    Metadata(VideoMetadata),
}

/// Terminal success of a download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub file_path: PathBuf,
    pub file_size_bytes: u64,
}

/// Transfer backend used by the queue.
///
/// The queue never looks at how bytes are fetched. Implementations report progress
/// through `events`, return the finished file or an error whose text is classified
/// for retry decisions, and must stop promptly once `cancel` fires.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Returns a unique identifier for this downloader (e.g., "yt-dlp")
    fn id(&self) -> &'static str;

    async fn download(
        &self,
        request: &DownloadRequest,
        events: mpsc::Sender<DownloadEvent>,
        cancel: CancellationToken,
    ) -> Result<DownloadedFile>;
}
