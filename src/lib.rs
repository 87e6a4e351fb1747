//! Tubeloader library

pub mod database;
pub mod downloader;
pub mod extractor;
pub mod queue;
pub mod utils;

// Re-export main types for easier use
pub use database::{DatabaseManager, MemoryStore, QueueStore};
pub use downloader::{DownloadEvent, DownloadRequest, DownloadedFile, Downloader, YtDlpDownloader};
pub use extractor::{VideoInfo, VideoMetadata, YtDlpExtractor};
pub use queue::{
    AddOptions, AddOutcome, CommandOutcome, ErrorKind, QueueEvent, QueueItem, QueueManager,
    QueueSnapshot, QueueStatus,
};
pub use utils::{AppSettings, TubeloaderError};
