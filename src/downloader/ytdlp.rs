//! yt-dlp backed downloader

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as AsyncCommand;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::downloader::progress::parse_yt_dlp_progress;
use crate::downloader::traits::{DownloadEvent, DownloadRequest, DownloadedFile, Downloader};
use crate::extractor::YtDlpExtractor;
use crate::utils::error::TubeloaderError;

const AUDIO_FORMATS: [&str; 7] = ["mp3", "m4a", "opus", "aac", "flac", "wav", "vorbis"];
const MERGE_FORMATS: [&str; 5] = ["mp4", "mkv", "webm", "mov", "flv"];
const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s [%(id)s].%(ext)s";
/// stderr lines kept for the failure message
const ERROR_TAIL: usize = 8;

/// Runs one yt-dlp subprocess per download
pub struct YtDlpDownloader {
    extractor: YtDlpExtractor,
    output_template: String,
}

impl YtDlpDownloader {
    pub fn new() -> Result<Self> {
        Ok(Self::with_extractor(YtDlpExtractor::new()?))
    }

    pub fn with_extractor(extractor: YtDlpExtractor) -> Self {
        Self {
            extractor,
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
        }
    }

    /// Override the yt-dlp output template (relative to the request's output dir)
    pub fn with_output_template(mut self, template: impl Into<String>) -> Self {
        self.output_template = template.into();
        self
    }

    fn build_args(&self, request: &DownloadRequest) -> Vec<String> {
        let output = request.output_dir.join(&self.output_template);
        let mut args = selection_args(&request.format, &request.quality);
        args.extend(
            [
                "--newline",
                "--progress",
                "--no-warnings",
                "--no-playlist",
                "--print",
                "after_move:filepath",
                "-o",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(output.to_string_lossy().into_owned());
        args.push(request.url.clone());
        args
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    fn id(&self) -> &'static str {
        "yt-dlp"
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        events: mpsc::Sender<DownloadEvent>,
        cancel: CancellationToken,
    ) -> Result<DownloadedFile> {
        debug!("yt-dlp download requested for {}", request.url);

        // Metadata is best effort; a failure here still lets the download report the real error
        tokio::select! {
            metadata = self.extractor.extract_metadata(&request.url) => match metadata {
                Ok(metadata) => {
                    let _ = events.send(DownloadEvent::Metadata(metadata)).await;
                }
                Err(e) => warn!("Metadata extraction failed for {}: {}", request.url, e),
            },
            _ = cancel.cancelled() => return Err(TubeloaderError::DownloadCancelled.into()),
        }

        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", request.output_dir.display()))?;

        let mut cmd = AsyncCommand::new(self.extractor.ytdlp_path());
        cmd.args(self.build_args(request))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().context("Failed to spawn yt-dlp")?;
        info!("yt-dlp started for {} (pid {:?})", request.video_id, child.id());

        let stdout_reader = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(read_output(stdout, events.clone())));
        let stderr_reader = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_output(stderr, events.clone())));

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill yt-dlp for {}: {}", request.video_id, e);
                }
                return Err(TubeloaderError::DownloadCancelled.into());
            }
        };

        let stdout = match stdout_reader {
            Some(handle) => handle.await.unwrap_or_default(),
            None => OutputSummary::default(),
        };
        let stderr = match stderr_reader {
            Some(handle) => handle.await.unwrap_or_default(),
            None => OutputSummary::default(),
        };

        if !status.success() {
            let message = stderr
                .error_text()
                .or_else(|| stdout.error_text())
                .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
            return Err(TubeloaderError::DownloadError(message).into());
        }

        let file_path = stdout
            .last_path
            .ok_or_else(|| TubeloaderError::DownloadError("yt-dlp did not report an output file".into()))?;
        let file_size_bytes = tokio::fs::metadata(&file_path)
            .await
            .with_context(|| format!("Downloaded file missing at {}", file_path.display()))?
            .len();

        let _ = events.send(DownloadEvent::Progress(100)).await;
        Ok(DownloadedFile {
            file_path,
            file_size_bytes,
        })
    }
}

/// What was left over after draining one output pipe
#[derive(Debug, Default)]
struct OutputSummary {
    last_path: Option<PathBuf>,
    tail: VecDeque<String>,
}

impl OutputSummary {
    fn error_text(&self) -> Option<String> {
        let errors: Vec<&str> = self
            .tail
            .iter()
            .filter(|line| line.starts_with("ERROR:"))
            .map(|line| line.as_str())
            .collect();
        if !errors.is_empty() {
            return Some(errors.join("\n"));
        }
        self.tail.back().cloned()
    }
}

/// Forward progress lines as events and remember the printed file path and error tail
async fn read_output<R>(pipe: R, events: mpsc::Sender<DownloadEvent>) -> OutputSummary
where
    R: AsyncRead + Unpin,
{
    let mut summary = OutputSummary::default();
    let mut lines = BufReader::new(pipe).lines();
    let mut last_percent = None;

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        if let Some(progress) = parse_yt_dlp_progress(&line) {
            let percent = progress.whole_percent();
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                let _ = events.send(DownloadEvent::Progress(percent)).await;
            }
            continue;
        }

        if !line.starts_with('[') && Path::new(&line).is_absolute() {
            summary.last_path = Some(PathBuf::from(&line));
            continue;
        }

        summary.tail.push_back(line);
        if summary.tail.len() > ERROR_TAIL {
            summary.tail.pop_front();
        }
    }

    summary
}

/// Map format/quality hints onto yt-dlp selection flags
pub fn selection_args(format: &str, quality: &str) -> Vec<String> {
    let format = format.trim().to_ascii_lowercase();
    let quality = quality.trim().to_ascii_lowercase();

    if AUDIO_FORMATS.contains(&format.as_str()) {
        let audio_quality = if quality == "worst" { "9" } else { "0" };
        return vec![
            "-x".to_string(),
            "--audio-format".to_string(),
            format,
            "--audio-quality".to_string(),
            audio_quality.to_string(),
        ];
    }

    let selector = match parse_height(&quality) {
        Some(height) => format!("bv*[height<={h}]+ba/b[height<={h}]", h = height),
        None if quality == "worst" => "wv*+wa/w".to_string(),
        None => "bv*+ba/b".to_string(),
    };

    let mut args = vec!["-f".to_string(), selector];
    if MERGE_FORMATS.contains(&format.as_str()) {
        args.push("--merge-output-format".to_string());
        args.push(format);
    }
    args
}

/// `1080p`, `720` or `4k` style quality hints
fn parse_height(quality: &str) -> Option<u32> {
    match quality {
        "4k" | "2160p" => Some(2160),
        "2k" | "1440p" => Some(1440),
        _ => quality.trim_end_matches('p').parse::<u32>().ok(),
    }
}
