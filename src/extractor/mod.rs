pub mod models;
pub mod ytdlp;

pub use models::{VideoInfo, VideoMetadata};
pub use ytdlp::{find_ytdlp, YtDlpExtractor};
