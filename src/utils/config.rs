//! Application configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::utils::paths::{get_database_path, get_downloads_dir};

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Download location
    pub download_location: PathBuf,

    /// SQLite database holding the queue
    pub database_path: PathBuf,

    /// Maximum concurrent downloads
    pub max_concurrent: usize,

    /// Automatic retries per item before a failure becomes terminal
    pub max_retries: u32,

    /// Backoff base, doubled for every retry
    pub retry_base_delay_ms: u64,

    /// Backoff cap
    pub retry_max_delay_ms: u64,

    /// Minimum interval between persisted progress writes
    pub progress_throttle_ms: u64,

    /// Per-download timeout; `None` lets a download hold its slot indefinitely
    pub download_timeout_secs: Option<u64>,

    /// URLs accepted in a single `add_to_queue` call
    pub max_batch_size: usize,

    /// Live (not completed, not cancelled) items the queue will hold
    pub max_queue_size: usize,

    /// Completed items kept in the queue view before archiving
    pub completed_retention: usize,

    /// Container/audio format used when a request does not name one
    pub default_format: String,

    /// Quality hint used when a request does not name one
    pub default_quality: String,

    /// Whether the scheduler launches downloads as soon as the queue opens
    pub auto_start: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            download_location: get_downloads_dir(),
            database_path: get_database_path(),
            max_concurrent: 3,
            max_retries: 3,
            retry_base_delay_ms: 5_000,
            retry_max_delay_ms: 30_000,
            progress_throttle_ms: 500,
            download_timeout_secs: None,
            max_batch_size: 100,
            max_queue_size: 1_000,
            completed_retention: 100,
            default_format: "mp4".to_string(),
            default_quality: "best".to_string(),
            auto_start: true,
        }
    }
}

impl AppSettings {
    /// Load settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: AppSettings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))?;

        info!("Loaded settings from {:?}", path);
        Ok(settings.validated())
    }

    /// Persist settings as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        Ok(())
    }

    /// Clamp values that would stall or break the queue
    pub fn validated(mut self) -> Self {
        if self.max_concurrent == 0 {
            warn!("max_concurrent must be at least 1, using 1");
            self.max_concurrent = 1;
        }
        if self.max_batch_size == 0 {
            self.max_batch_size = 1;
        }
        if self.max_queue_size == 0 {
            self.max_queue_size = 1;
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            self.retry_max_delay_ms = self.retry_base_delay_ms;
        }
        if self.download_timeout_secs == Some(0) {
            self.download_timeout_secs = None;
        }
        self
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn progress_throttle(&self) -> Duration {
        Duration::from_millis(self.progress_throttle_ms)
    }

    pub fn download_timeout(&self) -> Option<Duration> {
        self.download_timeout_secs.map(Duration::from_secs)
    }
}
