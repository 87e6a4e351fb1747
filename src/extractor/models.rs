//! Data structures for video information

use serde::{Deserialize, Serialize};

/// Subset of yt-dlp's `--dump-json` output the queue cares about
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    #[serde(alias = "webpage_url", default)]
    pub url: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub filesize: Option<u64>,
    pub thumbnail: Option<String>,
    pub channel: Option<String>,
    pub uploader: Option<String>,
    pub upload_date: Option<String>,
}

impl VideoInfo {
    pub fn into_metadata(self) -> VideoMetadata {
        VideoMetadata {
            title: Some(self.title).filter(|t| !t.is_empty()),
            channel_title: self.channel.or(self.uploader),
            thumbnail_ref: self.thumbnail,
        }
    }
}

/// Descriptive fields copied onto a queue item once a download starts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: Option<String>,
    pub channel_title: Option<String>,
    pub thumbnail_ref: Option<String>,
}
