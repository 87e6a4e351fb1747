//! The queue actor: sole owner of queue state and every transition

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::database::traits::QueueStore;
use crate::downloader::progress::ProgressThrottle;
use crate::downloader::traits::{DownloadEvent, DownloadRequest, DownloadedFile, Downloader};
use crate::queue::admission::{AdmissionController, AdmissionDecision};
use crate::queue::classifier::ErrorKind;
use crate::queue::events::QueueEvent;
use crate::queue::messages::{DownloadOutcome, QueueCommand};
use crate::queue::models::{
    AddOptions, AddOutcome, CommandOutcome, QueueItem, QueueStatus, SkippedUrl,
};
use crate::queue::retry::{RetryDecision, RetryPolicy};
use crate::queue::scheduler::Scheduler;
use crate::queue::state::QueueState;
use crate::utils::config::AppSettings;
use crate::utils::error::TubeloaderError;

/// How long shutdown waits for a cancelled download task before aborting it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Capacity of the per-download event channel
const DOWNLOAD_EVENT_BUFFER: usize = 64;

struct ActiveDownload {
    run: u64,
    cancel: CancellationToken,
    throttle: ProgressThrottle,
    handle: JoinHandle<()>,
}

pub struct QueueActor {
    receiver: mpsc::Receiver<QueueCommand>,
    /// Handed to download tasks and retry timers; weak so they never keep the queue alive
    handle: mpsc::WeakSender<QueueCommand>,
    events: broadcast::Sender<QueueEvent>,

    store: Arc<dyn QueueStore>,
    downloader: Arc<dyn Downloader>,
    settings: AppSettings,

    state: QueueState,
    scheduler: Scheduler,
    admission: AdmissionController,
    policy: RetryPolicy,

    active: HashMap<String, ActiveDownload>,
    retry_timers: HashMap<String, JoinHandle<()>>,
    next_run: u64,
}

impl QueueActor {
    pub fn new(
        settings: AppSettings,
        store: Arc<dyn QueueStore>,
        downloader: Arc<dyn Downloader>,
        policy: RetryPolicy,
        receiver: mpsc::Receiver<QueueCommand>,
        handle: mpsc::WeakSender<QueueCommand>,
        events: broadcast::Sender<QueueEvent>,
    ) -> Self {
        Self {
            receiver,
            handle,
            events,
            store,
            downloader,
            scheduler: Scheduler::new(settings.max_concurrent, settings.auto_start),
            admission: AdmissionController::from_settings(&settings),
            policy,
            settings,
            state: QueueState::default(),
            active: HashMap::new(),
            retry_timers: HashMap::new(),
            next_run: 0,
        }
    }

    /// Load the persisted queue and repair rows left behind by a previous process.
    ///
    /// Interrupted downloads go back to `queued` with progress 0, and failed rows
    /// with a pending automatic retry get their timer re-armed.
    pub async fn recover(&mut self) -> Result<()> {
        self.state = QueueState::load(self.store.as_ref()).await?;

        let interrupted: Vec<QueueItem> = self
            .state
            .items()
            .filter(|item| matches!(item.status, QueueStatus::Downloading | QueueStatus::Pending))
            .cloned()
            .collect();
        let interrupted_count = interrupted.len();
        for mut item in interrupted {
            debug!("Recovering interrupted download {}", item.id);
            item.requeue();
            self.commit(item).await?;
        }

        let pending_retries: Vec<(String, u32)> = self
            .state
            .items()
            .filter(|item| item.status == QueueStatus::Failed && item.is_retryable)
            .map(|item| (item.id.clone(), item.retry_count))
            .collect();
        let retry_count = pending_retries.len();
        for (id, attempt) in pending_retries {
            let delay = self.policy.get_delay(attempt.saturating_sub(1));
            self.arm_retry_timer(&id, attempt, delay);
        }

        info!(
            "Recovered {} queue item(s): {} interrupted, {} pending retr(ies)",
            self.state.len(),
            interrupted_count,
            retry_count
        );
        Ok(())
    }

    pub async fn run(mut self) {
        info!("Queue actor started");
        self.schedule().await;

        while let Some(command) = self.receiver.recv().await {
            match command {
                QueueCommand::Add {
                    urls,
                    options,
                    reply,
                } => {
                    let result = self.add(urls, options).await;
                    self.schedule().await;
                    let _ = reply.send(result);
                }
                QueueCommand::Status { reply } => {
                    let _ = reply.send(self.state.snapshot());
                }
                QueueCommand::GetItem { id, reply } => {
                    let _ = reply.send(self.state.get(&id).cloned());
                }
                QueueCommand::Pause { id, reply } => {
                    let result = self.pause(&id).await;
                    self.schedule().await;
                    let _ = reply.send(result);
                }
                QueueCommand::Resume { id, reply } => {
                    let result = self.resume(&id).await;
                    self.schedule().await;
                    let _ = reply.send(result);
                }
                QueueCommand::Cancel { id, reply } => {
                    let result = self.cancel(&id).await;
                    self.schedule().await;
                    let _ = reply.send(result);
                }
                QueueCommand::Retry { id, reply } => {
                    let result = self.retry(&id).await;
                    self.schedule().await;
                    let _ = reply.send(result);
                }
                QueueCommand::ClearCompleted { reply } => {
                    let result = self.archive_completed().await.map(|count| {
                        CommandOutcome::ok(format!("Archived {} completed download(s)", count))
                    });
                    let _ = reply.send(result);
                }
                QueueCommand::Start { reply } => {
                    self.scheduler.start();
                    self.emit(QueueEvent::SchedulerStarted);
                    info!("Queue started");
                    self.schedule().await;
                    let _ = reply.send(CommandOutcome::ok("Queue started"));
                }
                QueueCommand::Stop { reply } => {
                    self.scheduler.stop();
                    self.emit(QueueEvent::SchedulerStopped);
                    info!("Queue stopped, {} download(s) still running", self.active.len());
                    let _ = reply.send(CommandOutcome::ok("Queue stopped"));
                }
                QueueCommand::Shutdown { reply } => {
                    self.receiver.close();
                    self.shutdown().await;
                    let _ = reply.send(());
                    return;
                }
                QueueCommand::Download { id, run, event } => {
                    self.on_download_event(&id, run, event).await;
                }
                QueueCommand::DownloadFinished { id, run, outcome } => {
                    self.on_download_finished(&id, run, outcome).await;
                    self.schedule().await;
                }
                QueueCommand::RetryDue { id, attempt } => {
                    self.on_retry_due(&id, attempt).await;
                    self.schedule().await;
                }
            }
        }

        // Every handle is gone
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        info!(
            "Shutting down queue: cancelling {} download(s), {} retry timer(s)",
            self.active.len(),
            self.retry_timers.len()
        );

        for (_, timer) in self.retry_timers.drain() {
            timer.abort();
        }

        let active: Vec<ActiveDownload> = self.active.drain().map(|(_, a)| a).collect();
        for download in &active {
            download.cancel.cancel();
        }
        for download in active {
            let abort = download.handle.abort_handle();
            if tokio::time::timeout(SHUTDOWN_GRACE, download.handle).await.is_err() {
                warn!("Download task did not stop in time, aborting");
                abort.abort();
            }
        }
    }

    /// Persist `item`, then publish it to the in-memory view
    async fn commit(&mut self, mut item: QueueItem) -> Result<()> {
        item.updated_at = Utc::now();
        self.store
            .save_item(&item)
            .await
            .with_context(|| format!("Failed to persist queue item {}", item.id))?;
        self.state.upsert(item);
        Ok(())
    }

    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn add(&mut self, urls: Vec<String>, options: AddOptions) -> Result<AddOutcome> {
        let mut download_ids = Vec::new();
        let mut skipped_urls = Vec::new();

        for (position, url) in urls.iter().enumerate() {
            match self.admission.evaluate(url, position, &self.state) {
                AdmissionDecision::Insert { video_id } => {
                    let mut item = QueueItem::new(
                        url.trim(),
                        &video_id,
                        options.priority.unwrap_or(0),
                        options
                            .format
                            .as_deref()
                            .unwrap_or(&self.settings.default_format),
                        options
                            .quality
                            .as_deref()
                            .unwrap_or(&self.settings.default_quality),
                        self.settings.max_retries,
                    );
                    item.status = QueueStatus::Queued;

                    let id = item.id.clone();
                    self.commit(item).await?;
                    info!("Queued {} as {}", video_id, id);
                    self.emit(QueueEvent::ItemAdded {
                        id: id.clone(),
                        video_id,
                        timestamp: Utc::now(),
                    });
                    download_ids.push(id);
                }
                AdmissionDecision::Requeue { id } => {
                    let Some(mut item) = self.state.get(&id).cloned() else {
                        continue;
                    };
                    self.abort_retry_timer(&id);

                    item.url = url.trim().to_string();
                    if let Some(priority) = options.priority {
                        item.priority = priority;
                    }
                    if let Some(format) = &options.format {
                        item.format = format.clone();
                    }
                    if let Some(quality) = &options.quality {
                        item.quality = quality.clone();
                    }
                    item.retry_count = 0;
                    item.cancelled_at = None;
                    item.requeue();

                    let video_id = item.video_id.clone();
                    self.commit(item).await?;
                    info!("Re-queued {} ({})", video_id, id);
                    self.emit(QueueEvent::ItemAdded {
                        id: id.clone(),
                        video_id,
                        timestamp: Utc::now(),
                    });
                    download_ids.push(id);
                }
                AdmissionDecision::Skip(reason) => {
                    debug!("Skipping {}: {}", url, reason);
                    skipped_urls.push(SkippedUrl {
                        url: url.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(AddOutcome::new(download_ids, skipped_urls))
    }

    async fn pause(&mut self, id: &str) -> Result<CommandOutcome> {
        let Some(mut item) = self.state.get(id).cloned() else {
            return Ok(not_found(id));
        };

        match item.status {
            QueueStatus::Downloading | QueueStatus::Queued => {
                item.status = QueueStatus::Paused;
                item.paused_at = Some(Utc::now());
                self.commit(item).await?;
                self.stop_active(id);

                info!("Paused {}", id);
                self.emit(QueueEvent::ItemPaused {
                    id: id.to_string(),
                    timestamp: Utc::now(),
                });
                Ok(CommandOutcome::ok("Download paused"))
            }
            status => Ok(CommandOutcome::rejected(format!(
                "Cannot pause a {} download",
                status
            ))),
        }
    }

    async fn resume(&mut self, id: &str) -> Result<CommandOutcome> {
        let Some(mut item) = self.state.get(id).cloned() else {
            return Ok(not_found(id));
        };

        if item.status != QueueStatus::Paused {
            return Ok(CommandOutcome::rejected(format!(
                "Cannot resume a {} download",
                item.status
            )));
        }

        item.requeue();
        self.commit(item).await?;

        info!("Resumed {}", id);
        self.emit(QueueEvent::ItemResumed {
            id: id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(CommandOutcome::ok("Download resumed"))
    }

    async fn cancel(&mut self, id: &str) -> Result<CommandOutcome> {
        let Some(mut item) = self.state.get(id).cloned() else {
            return Ok(not_found(id));
        };

        match item.status {
            QueueStatus::Queued | QueueStatus::Downloading | QueueStatus::Paused => {
                item.status = QueueStatus::Cancelled;
                item.cancelled_at = Some(Utc::now());
                self.commit(item).await?;
                self.stop_active(id);

                info!("Cancelled {}", id);
                self.emit(QueueEvent::ItemCancelled {
                    id: id.to_string(),
                    timestamp: Utc::now(),
                });
                Ok(CommandOutcome::ok("Download cancelled"))
            }
            QueueStatus::Cancelled => Ok(CommandOutcome::ok("Download already cancelled")),
            status => Ok(CommandOutcome::rejected(format!(
                "Cannot cancel a {} download",
                status
            ))),
        }
    }

    async fn retry(&mut self, id: &str) -> Result<CommandOutcome> {
        let Some(mut item) = self.state.get(id).cloned() else {
            return Ok(not_found(id));
        };

        if item.status != QueueStatus::Failed {
            return Ok(CommandOutcome::rejected(format!(
                "Cannot retry a {} download",
                item.status
            )));
        }
        if item.error_kind == Some(ErrorKind::Restricted) {
            return Ok(CommandOutcome::rejected(
                "This video is restricted and cannot be retried",
            ));
        }

        item.requeue();
        self.commit(item).await?;
        self.abort_retry_timer(id);

        info!("Manual retry of {}", id);
        self.emit(QueueEvent::ItemResumed {
            id: id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(CommandOutcome::ok("Download re-queued"))
    }

    /// Archive completed items beyond the retention limit, oldest first
    async fn archive_completed(&mut self) -> Result<usize> {
        let expired: Vec<QueueItem> = self
            .state
            .visible_completed()
            .into_iter()
            .skip(self.settings.completed_retention)
            .cloned()
            .collect();

        let count = expired.len();
        for mut item in expired {
            item.archived_at = Some(Utc::now());
            item.progress = 0;
            item.error_message = None;
            item.error_kind = None;
            item.is_retryable = false;
            item.retry_count = 0;
            item.started_at = None;
            item.paused_at = None;
            self.commit(item).await?;
        }

        if count > 0 {
            info!("Archived {} completed download(s)", count);
            self.emit(QueueEvent::ItemsArchived { count });
        }
        Ok(count)
    }

    /// Fill free slots with the next queued items
    async fn schedule(&mut self) {
        for id in self.scheduler.next_batch(&self.state) {
            if let Err(e) = self.start_download(&id).await {
                error!("Failed to start download {}: {:#}", id, e);
            }
        }
    }

    async fn start_download(&mut self, id: &str) -> Result<()> {
        let Some(mut item) = self.state.get(id).cloned() else {
            return Err(TubeloaderError::TaskNotFound(id.to_string()).into());
        };

        item.status = QueueStatus::Downloading;
        item.progress = 0;
        item.started_at = Some(Utc::now());
        let request = DownloadRequest {
            id: item.id.clone(),
            url: item.url.clone(),
            video_id: item.video_id.clone(),
            format: item.format.clone(),
            quality: item.quality.clone(),
            output_dir: self.settings.download_location.clone(),
        };
        self.commit(item).await?;

        let run = self.next_run;
        self.next_run += 1;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_download(
            self.downloader.clone(),
            request,
            run,
            cancel.clone(),
            self.handle.clone(),
            self.settings.download_timeout(),
        ));

        self.active.insert(
            id.to_string(),
            ActiveDownload {
                run,
                cancel,
                throttle: ProgressThrottle::new(self.settings.progress_throttle()),
                handle,
            },
        );

        info!(
            "Started download {} with {} ({}/{} slots)",
            id,
            self.downloader.id(),
            self.active.len(),
            self.scheduler.max_concurrent()
        );
        self.emit(QueueEvent::ItemStarted {
            id: id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Signal a running download to stop and release its slot
    fn stop_active(&mut self, id: &str) {
        if let Some(download) = self.active.remove(id) {
            debug!("Cancelling run {} of {}", download.run, id);
            download.cancel.cancel();
        }
    }

    fn is_current(&self, id: &str, run: u64) -> bool {
        self.active.get(id).map_or(false, |download| download.run == run)
    }

    async fn on_download_event(&mut self, id: &str, run: u64, event: DownloadEvent) {
        if !self.is_current(id, run) {
            return;
        }
        let Some(mut item) = self.state.get(id).cloned() else {
            return;
        };

        match event {
            DownloadEvent::Progress(percent) => {
                let percent = percent.min(100);
                if percent <= item.progress {
                    return;
                }
                item.progress = percent;

                let write = self
                    .active
                    .get_mut(id)
                    .map_or(true, |download| download.throttle.should_write(percent));
                if write {
                    if let Err(e) = self.commit(item).await {
                        warn!("Failed to persist progress for {}: {:#}", id, e);
                        return;
                    }
                } else {
                    self.state.upsert(item);
                }

                self.emit(QueueEvent::Progress {
                    id: id.to_string(),
                    percent,
                });
            }
            DownloadEvent::Metadata(metadata) => {
                item.title = metadata.title.or(item.title);
                item.channel_title = metadata.channel_title.or(item.channel_title);
                item.thumbnail_ref = metadata.thumbnail_ref.or(item.thumbnail_ref);
                if let Err(e) = self.commit(item).await {
                    warn!("Failed to persist metadata for {}: {:#}", id, e);
                }
            }
        }
    }

    async fn on_download_finished(&mut self, id: &str, run: u64, outcome: DownloadOutcome) {
        if !self.is_current(id, run) {
            debug!("Ignoring result of superseded run {} of {}", run, id);
            return;
        }
        self.active.remove(id);

        let result = match outcome {
            DownloadOutcome::Completed(file) => self.complete(id, file).await,
            DownloadOutcome::Failed(error) => self.fail(id, error).await,
        };
        if let Err(e) = result {
            error!("Failed to record result of {}: {:#}", id, e);
        }
    }

    async fn complete(&mut self, id: &str, file: DownloadedFile) -> Result<()> {
        let Some(mut item) = self.state.get(id).cloned() else {
            return Err(TubeloaderError::TaskNotFound(id.to_string()).into());
        };

        let now = Utc::now();
        item.status = QueueStatus::Completed;
        item.progress = 100;
        item.file_path = Some(file.file_path.clone());
        item.file_size_bytes = Some(file.file_size_bytes);
        item.completed_at = Some(now);
        item.error_message = None;
        item.error_kind = None;
        item.is_retryable = false;
        self.commit(item).await?;

        info!(
            "Completed {} -> {} ({} bytes)",
            id,
            file.file_path.display(),
            file.file_size_bytes
        );
        self.emit(QueueEvent::ItemCompleted {
            id: id.to_string(),
            file_path: file.file_path,
            timestamp: now,
        });

        self.archive_completed().await?;
        Ok(())
    }

    async fn fail(&mut self, id: &str, error: String) -> Result<()> {
        let Some(mut item) = self.state.get(id).cloned() else {
            return Err(TubeloaderError::TaskNotFound(id.to_string()).into());
        };

        let kind = self.policy.classify(&error);
        // Restricted failures are terminal and do not use up the retry budget
        if kind.is_retryable() {
            item.retry_count += 1;
        }
        let decision = self.policy.decide(kind, item.retry_count, item.max_retries);

        item.status = QueueStatus::Failed;
        item.error_message = Some(error.clone());
        item.error_kind = Some(kind);
        item.file_path = None;
        item.file_size_bytes = None;

        match decision {
            RetryDecision::Retry { delay } => {
                item.is_retryable = true;
                let attempt = item.retry_count;
                self.commit(item).await?;

                warn!(
                    "Download {} failed ({}): {}; retry {} in {:?}",
                    id, kind, error, attempt, delay
                );
                self.emit(QueueEvent::ItemFailed {
                    id: id.to_string(),
                    error,
                    kind,
                    retryable: true,
                    timestamp: Utc::now(),
                });
                self.emit(QueueEvent::RetryScheduled {
                    id: id.to_string(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
                self.arm_retry_timer(id, attempt, delay);
            }
            RetryDecision::GiveUp => {
                item.is_retryable = false;
                let failures = item.retry_count;
                self.commit(item).await?;

                error!(
                    "Download {} failed ({}), {} counted failure(s): {}",
                    id, kind, failures, error
                );
                self.emit(QueueEvent::ItemFailed {
                    id: id.to_string(),
                    error,
                    kind,
                    retryable: false,
                    timestamp: Utc::now(),
                });
            }
        }
        Ok(())
    }

    fn arm_retry_timer(&mut self, id: &str, attempt: u32, delay: Duration) {
        self.abort_retry_timer(id);

        let handle = self.handle.clone();
        let item_id = id.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(sender) = handle.upgrade() {
                let _ = sender
                    .send(QueueCommand::RetryDue {
                        id: item_id,
                        attempt,
                    })
                    .await;
            }
        });
        self.retry_timers.insert(id.to_string(), timer);
    }

    fn abort_retry_timer(&mut self, id: &str) {
        if let Some(timer) = self.retry_timers.remove(id) {
            timer.abort();
        }
    }

    async fn on_retry_due(&mut self, id: &str, attempt: u32) {
        let Some(mut item) = self.state.get(id).cloned() else {
            return;
        };
        // Re-added, retried by hand or failed again since the timer was armed
        if item.status != QueueStatus::Failed || !item.is_retryable || item.retry_count != attempt {
            return;
        }
        self.retry_timers.remove(id);

        item.requeue();
        if let Err(e) = self.commit(item).await {
            error!("Failed to re-queue {} for retry {}: {:#}", id, attempt, e);
            return;
        }

        info!("Retry {} of {} is due, re-queued", attempt, id);
        self.emit(QueueEvent::ItemResumed {
            id: id.to_string(),
            timestamp: Utc::now(),
        });
    }
}

fn not_found(id: &str) -> CommandOutcome {
    CommandOutcome::rejected(TubeloaderError::TaskNotFound(id.to_string()).to_string())
}

/// Body of a download task: runs the transfer and reports back to the actor
async fn run_download(
    downloader: Arc<dyn Downloader>,
    request: DownloadRequest,
    run: u64,
    cancel: CancellationToken,
    actor: mpsc::WeakSender<QueueCommand>,
    timeout: Option<Duration>,
) {
    let (events_tx, mut events_rx) = mpsc::channel(DOWNLOAD_EVENT_BUFFER);
    let id = request.id.clone();

    let transfer = async {
        let download = downloader.download(&request, events_tx, cancel.clone());
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, download).await {
                Ok(result) => result,
                Err(_) => Err(TubeloaderError::DownloadError("download timed out".into()).into()),
            },
            None => download.await,
        }
    };

    let forward = async {
        while let Some(event) = events_rx.recv().await {
            let command = QueueCommand::Download {
                id: id.clone(),
                run,
                event,
            };
            if !send_to_actor(&actor, command).await {
                break;
            }
        }
    };

    let (result, ()) = tokio::join!(transfer, forward);

    if cancel.is_cancelled() {
        debug!("Run {} of {} stopped after cancellation", run, id);
        return;
    }

    let outcome = match result {
        Ok(file) => DownloadOutcome::Completed(file),
        Err(e) => DownloadOutcome::Failed(format!("{:#}", e)),
    };
    send_to_actor(&actor, QueueCommand::DownloadFinished { id, run, outcome }).await;
}

async fn send_to_actor(actor: &mpsc::WeakSender<QueueCommand>, command: QueueCommand) -> bool {
    match actor.upgrade() {
        Some(sender) => sender.send(command).await.is_ok(),
        None => false,
    }
}
