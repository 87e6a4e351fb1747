//! Download backends

pub mod progress;
pub mod traits;
pub mod ytdlp;

// Re-export for convenience
pub use progress::{parse_yt_dlp_progress, ProgressThrottle};
pub use traits::{DownloadEvent, DownloadRequest, DownloadedFile, Downloader};
pub use ytdlp::YtDlpDownloader;
