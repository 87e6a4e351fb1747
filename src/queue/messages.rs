use anyhow::Result;
use tokio::sync::oneshot;

use crate::downloader::traits::{DownloadEvent, DownloadedFile};
use crate::queue::models::{AddOptions, AddOutcome, CommandOutcome, QueueItem, QueueSnapshot};

/// Commands handled by the queue actor.
///
/// The first group comes from [`QueueManager`](crate::queue::QueueManager) handles;
/// the rest are sent by download tasks and retry timers the actor spawned.
#[derive(Debug)]
pub enum QueueCommand {
    Add {
        urls: Vec<String>,
        options: AddOptions,
        reply: oneshot::Sender<Result<AddOutcome>>,
    },
    Status {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    GetItem {
        id: String,
        reply: oneshot::Sender<Option<QueueItem>>,
    },
    Pause {
        id: String,
        reply: oneshot::Sender<Result<CommandOutcome>>,
    },
    Resume {
        id: String,
        reply: oneshot::Sender<Result<CommandOutcome>>,
    },
    Cancel {
        id: String,
        reply: oneshot::Sender<Result<CommandOutcome>>,
    },
    Retry {
        id: String,
        reply: oneshot::Sender<Result<CommandOutcome>>,
    },
    ClearCompleted {
        reply: oneshot::Sender<Result<CommandOutcome>>,
    },
    Start {
        reply: oneshot::Sender<CommandOutcome>,
    },
    Stop {
        reply: oneshot::Sender<CommandOutcome>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },

    // Internal
    Download {
        id: String,
        run: u64,
        event: DownloadEvent,
    },
    DownloadFinished {
        id: String,
        run: u64,
        outcome: DownloadOutcome,
    },
    RetryDue {
        id: String,
        attempt: u32,
    },
}

/// How a download run ended, as reported by its task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed(DownloadedFile),
    /// Error text, classified by the actor
    Failed(String),
}
