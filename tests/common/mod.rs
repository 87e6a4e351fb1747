//! Shared fixtures for the queue integration tests
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tubeloader::downloader::{DownloadEvent, DownloadRequest, DownloadedFile, Downloader};
use tubeloader::extractor::VideoMetadata;
use tubeloader::queue::{QueueItem, QueueManager, QueueSnapshot, QueueStatus};
use tubeloader::utils::{AppSettings, TubeloaderError};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One instruction for a running scripted download
#[derive(Debug, Clone)]
pub enum Step {
    Progress(u8),
    Metadata(VideoMetadata),
    Complete,
    Fail(String),
}

/// In-process downloader driven by the test.
///
/// Each run registers a control channel under its video id; the test feeds it
/// [`Step`]s. In auto mode every run completes on its own after a short delay.
#[derive(Default)]
pub struct ScriptedDownloader {
    controls: Mutex<HashMap<String, (u64, mpsc::UnboundedSender<Step>)>>,
    starts: Mutex<HashMap<String, u32>>,
    runs: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    cancellations: AtomicUsize,
    auto_complete: Option<Duration>,
}

impl ScriptedDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every run reports 50% and then completes after `delay`
    pub fn auto_complete(delay: Duration) -> Self {
        Self {
            auto_complete: Some(delay),
            ..Self::default()
        }
    }

    /// Feed `step` to the current run of `video_id`, waiting for it to start
    pub async fn step(&self, video_id: &str, step: Step) {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            let control = self
                .controls
                .lock()
                .unwrap()
                .get(video_id)
                .map(|(_, tx)| tx.clone());
            if let Some(tx) = control {
                if tx.send(step.clone()).is_ok() {
                    return;
                }
            }
            assert!(
                Instant::now() < deadline,
                "no running download for {}",
                video_id
            );
            sleep(POLL_INTERVAL).await;
        }
    }

    pub fn starts(&self, video_id: &str) -> u32 {
        self.starts
            .lock()
            .unwrap()
            .get(video_id)
            .copied()
            .unwrap_or(0)
    }

    pub async fn wait_for_starts(&self, video_id: &str, count: u32) {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while self.starts(video_id) < count {
            assert!(
                Instant::now() < deadline,
                "{} started {} time(s), expected {}",
                video_id,
                self.starts(video_id),
                count
            );
            sleep(POLL_INTERVAL).await;
        }
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    fn finish_run(&self, video_id: &str, run: u64) {
        let mut controls = self.controls.lock().unwrap();
        if controls.get(video_id).map(|(r, _)| *r) == Some(run) {
            controls.remove(video_id);
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    async fn drive(
        &self,
        request: &DownloadRequest,
        events: &mpsc::Sender<DownloadEvent>,
        cancel: &CancellationToken,
        mut steps: mpsc::UnboundedReceiver<Step>,
    ) -> Result<DownloadedFile> {
        let finished = DownloadedFile {
            file_path: request
                .output_dir
                .join(format!("{}.{}", request.video_id, request.format)),
            file_size_bytes: 1024,
        };

        if let Some(delay) = self.auto_complete {
            let _ = events.send(DownloadEvent::Progress(50)).await;
            return tokio::select! {
                _ = cancel.cancelled() => {
                    self.cancellations.fetch_add(1, Ordering::SeqCst);
                    Err(TubeloaderError::DownloadCancelled.into())
                }
                _ = sleep(delay) => Ok(finished),
            };
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.cancellations.fetch_add(1, Ordering::SeqCst);
                    return Err(TubeloaderError::DownloadCancelled.into());
                }
                step = steps.recv() => match step {
                    Some(Step::Progress(percent)) => {
                        let _ = events.send(DownloadEvent::Progress(percent)).await;
                    }
                    Some(Step::Metadata(metadata)) => {
                        let _ = events.send(DownloadEvent::Metadata(metadata)).await;
                    }
                    Some(Step::Complete) => return Ok(finished),
                    Some(Step::Fail(error)) => return Err(anyhow!(error)),
                    None => return Err(anyhow!("script dropped")),
                },
            }
        }
    }
}

#[async_trait]
impl Downloader for ScriptedDownloader {
    fn id(&self) -> &'static str {
        "scripted"
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        events: mpsc::Sender<DownloadEvent>,
        cancel: CancellationToken,
    ) -> Result<DownloadedFile> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) as u64;
        let (tx, rx) = mpsc::unbounded_channel();
        self.controls
            .lock()
            .unwrap()
            .insert(request.video_id.clone(), (run, tx));
        *self
            .starts
            .lock()
            .unwrap()
            .entry(request.video_id.clone())
            .or_insert(0) += 1;

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        let result = self.drive(request, &events, &cancel, rx).await;
        self.finish_run(&request.video_id, run);
        result
    }
}

/// Settings with short backoff and no progress throttling
pub fn test_settings(dir: &Path) -> AppSettings {
    AppSettings {
        download_location: dir.join("downloads"),
        database_path: dir.join("queue.db"),
        retry_base_delay_ms: 50,
        retry_max_delay_ms: 200,
        progress_throttle_ms: 0,
        ..AppSettings::default()
    }
}

/// Distinct, valid 11-character video id
pub fn video_id(n: usize) -> String {
    format!("vid{:08}", n)
}

pub fn video_url(n: usize) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id(n))
}

/// Poll the queue until `predicate` holds
pub async fn wait_until<F>(queue: &QueueManager, mut predicate: F) -> QueueSnapshot
where
    F: FnMut(&QueueSnapshot) -> bool,
{
    let deadline = Instant::now() + WAIT_TIMEOUT;
    loop {
        let snapshot = queue.get_queue_status().await.unwrap();
        if predicate(&snapshot) {
            return snapshot;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for queue, last stats {:?}",
            snapshot.stats
        );
        sleep(POLL_INTERVAL).await;
    }
}

/// Poll until the item reaches `status`
pub async fn wait_for_status(queue: &QueueManager, id: &str, status: QueueStatus) -> QueueItem {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    loop {
        let item = queue.get_item(id).await.unwrap().expect("item exists");
        if item.status == status {
            return item;
        }
        assert!(
            Instant::now() < deadline,
            "{} is {}, expected {}",
            id,
            item.status,
            status
        );
        sleep(POLL_INTERVAL).await;
    }
}

pub async fn video_id_of(queue: &QueueManager, id: &str) -> String {
    queue.get_item(id).await.unwrap().expect("item exists").video_id
}
