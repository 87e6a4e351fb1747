//! Tubeloader - persistent download queue for yt-dlp
//!
//! Every command opens the queue database, applies one operation and exits.
//! `run` keeps the queue open and processes downloads until nothing is left to do.
//! Commands that change the queue need exclusive ownership of the database and
//! are refused while another process (usually `run`) holds it; `status` only reads.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tubeloader::database::{initialize_database, DatabaseManager, QueueLock};
use tubeloader::downloader::{DownloadEvent, DownloadRequest, DownloadedFile, Downloader};
use tubeloader::queue::{
    AddOptions, CommandOutcome, QueueEvent, QueueManager, QueueSnapshot, QueueState, QueueStatus,
};
use tubeloader::utils::{get_settings_path, AppSettings, TubeloaderError};
use tubeloader::YtDlpDownloader;

#[derive(Parser)]
#[command(name = "tubeloader", version, about = "Persistent download queue for yt-dlp")]
struct Args {
    /// Settings file (defaults to settings.json in the app support directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Queue database, overriding the settings file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Maximum concurrent downloads, overriding the settings file
    #[arg(long, global = true)]
    max_concurrent: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add one or more video URLs to the queue
    Add {
        #[arg(required = true)]
        urls: Vec<String>,
        #[arg(long)]
        priority: Option<i32>,
        #[arg(long)]
        format: Option<String>,
        #[arg(long)]
        quality: Option<String>,
    },
    /// Show the queue
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    Pause { id: String },
    Resume { id: String },
    Cancel { id: String },
    Retry { id: String },
    /// Archive completed downloads beyond the retention limit
    ClearCompleted,
    /// Process the queue until it is idle (Ctrl-C to stop)
    Run,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let settings_path = args.settings.clone().unwrap_or_else(get_settings_path);
    let mut settings = AppSettings::load(&settings_path)?;
    if let Some(db) = args.db {
        settings.database_path = db;
    }
    if let Some(max_concurrent) = args.max_concurrent {
        settings.max_concurrent = max_concurrent;
    }

    if let Command::Status { json } = args.command {
        return show_status(&settings, json).await;
    }

    // Only the lock holder may recover or mutate the queue; a second process
    // would overwrite rows the owner is still driving
    let lock = QueueLock::acquire(&settings.database_path)?;
    info!("Holding {}", lock.path().display());

    let pool = initialize_database(&settings.database_path).await?;
    let store = Arc::new(DatabaseManager::new(pool));

    let processing = matches!(args.command, Command::Run);
    let downloader: Arc<dyn Downloader> = if processing {
        settings.auto_start = true;
        Arc::new(YtDlpDownloader::new().context("yt-dlp is required to process the queue")?)
    } else {
        // One-shot commands never start downloads
        settings.auto_start = false;
        Arc::new(IdleDownloader)
    };

    let queue = QueueManager::open(settings, store.clone(), downloader).await?;
    let result = execute(&queue, args.command).await;

    queue.shutdown().await;
    store.close().await;
    drop(lock);
    result
}

/// Print the persisted queue without taking ownership of it, so this works while
/// `tubeloader run` is active
async fn show_status(settings: &AppSettings, json: bool) -> Result<()> {
    let store = DatabaseManager::new(initialize_database(&settings.database_path).await?);
    let state = QueueState::load(&store).await;
    store.close().await;

    let snapshot = state?.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

async fn execute(queue: &QueueManager, command: Command) -> Result<()> {
    match command {
        Command::Add {
            urls,
            priority,
            format,
            quality,
        } => {
            let outcome = queue
                .add_to_queue(
                    urls,
                    AddOptions {
                        priority,
                        format,
                        quality,
                    },
                )
                .await?;
            println!("{}", outcome.message);
            for id in &outcome.download_ids {
                println!("  + {}", id);
            }
            for skipped in &outcome.skipped_urls {
                println!("  - {} ({})", skipped.url, skipped.reason);
            }
        }
        Command::Status { .. } => unreachable!("status is served without opening the queue"),
        Command::Pause { id } => report(queue.pause_download(&id).await?),
        Command::Resume { id } => report(queue.resume_download(&id).await?),
        Command::Cancel { id } => report(queue.cancel_download(&id).await?),
        Command::Retry { id } => report(queue.retry_download(&id).await?),
        Command::ClearCompleted => report(queue.clear_completed().await?),
        Command::Run => process_queue(queue).await?,
    }
    Ok(())
}

fn report(outcome: CommandOutcome) {
    if outcome.success {
        println!("{}", outcome.message);
    } else {
        eprintln!("{}", outcome.message);
    }
}

fn print_snapshot(snapshot: &QueueSnapshot) {
    let stats = &snapshot.stats;
    println!(
        "{} downloading, {} queued, {} paused, {} failed, {} completed",
        stats.total_active,
        stats.total_queued,
        snapshot.paused.len(),
        stats.total_failed,
        stats.total_completed
    );

    let rows = snapshot
        .downloading
        .iter()
        .chain(&snapshot.queued)
        .chain(&snapshot.paused)
        .chain(&snapshot.failed)
        .chain(&snapshot.completed);
    for item in rows {
        let label = item.title.as_deref().unwrap_or(&item.url);
        println!(
            "{:<12} {:>3}%  {}  {}  {}",
            item.status.as_str(),
            item.progress,
            item.id,
            item.video_id,
            label
        );
        if item.status == QueueStatus::Failed {
            if let Some(error) = &item.error_message {
                println!("{:<18}{}", "", error);
            }
        }
    }
}

/// Idle means nothing is running, waiting for a slot, or waiting for a retry
fn is_idle(snapshot: &QueueSnapshot) -> bool {
    snapshot.downloading.is_empty()
        && snapshot.queued.is_empty()
        && !snapshot.failed.iter().any(|item| item.is_retryable)
}

async fn process_queue(queue: &QueueManager) -> Result<()> {
    let mut events = queue.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping queue");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => warn!("Missed {} queue event(s)", missed),
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                if is_idle(&queue.get_queue_status().await?) {
                    println!("Queue is idle");
                    break;
                }
            }
        }
    }
    Ok(())
}

fn print_event(event: &QueueEvent) {
    match event {
        QueueEvent::ItemStarted { id, .. } => println!("started    {}", id),
        QueueEvent::Progress { id, percent } => println!("{:>3}%       {}", percent, id),
        QueueEvent::ItemCompleted { id, file_path, .. } => {
            println!("completed  {} -> {}", id, file_path.display())
        }
        QueueEvent::ItemFailed { id, error, kind, .. } => {
            println!("failed     {} [{}] {}", id, kind, error)
        }
        QueueEvent::RetryScheduled {
            id,
            attempt,
            delay_ms,
        } => println!("retry #{}   {} in {} ms", attempt, id, delay_ms),
        _ => {}
    }
}

/// Stands in for yt-dlp in one-shot commands, where the scheduler never runs
struct IdleDownloader;

#[async_trait]
impl Downloader for IdleDownloader {
    fn id(&self) -> &'static str {
        "idle"
    }

    async fn download(
        &self,
        _request: &DownloadRequest,
        _events: mpsc::Sender<DownloadEvent>,
        _cancel: CancellationToken,
    ) -> Result<DownloadedFile> {
        Err(TubeloaderError::OperationFailed("downloads only run under `tubeloader run`".into()).into())
    }
}
