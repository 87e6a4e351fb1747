//! Public handle to the download queue

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::info;

use crate::database::traits::QueueStore;
use crate::downloader::traits::Downloader;
use crate::queue::actor::QueueActor;
use crate::queue::events::QueueEvent;
use crate::queue::messages::QueueCommand;
use crate::queue::models::{AddOptions, AddOutcome, CommandOutcome, QueueItem, QueueSnapshot};
use crate::queue::retry::RetryPolicy;
use crate::utils::config::AppSettings;
use crate::utils::error::TubeloaderError;

const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 1024;

/// Queue manager for handling multiple downloads.
///
/// Cheap to clone. Every clone talks to the same actor task, which owns the queue
/// and performs all transitions one at a time. The queue shuts down when
/// [`QueueManager::shutdown`] is called or the last handle is dropped.
#[derive(Debug, Clone)]
pub struct QueueManager {
    sender: mpsc::Sender<QueueCommand>,
    events: broadcast::Sender<QueueEvent>,
}

impl QueueManager {
    /// Recover the persisted queue from `store` and start the actor.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn open(
        settings: AppSettings,
        store: Arc<dyn QueueStore>,
        downloader: Arc<dyn Downloader>,
    ) -> Result<Self> {
        let settings = settings.validated();
        let policy = RetryPolicy::from_settings(&settings);
        Self::open_with_policy(settings, store, downloader, policy).await
    }

    /// Like [`QueueManager::open`], with a caller-supplied retry policy.
    ///
    /// Use [`RetryPolicy::with_classifier`] to plug in a custom error table.
    pub async fn open_with_policy(
        settings: AppSettings,
        store: Arc<dyn QueueStore>,
        downloader: Arc<dyn Downloader>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let settings = settings.validated();
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        info!(
            "Opening download queue (max {} concurrent, downloader {})",
            settings.max_concurrent,
            downloader.id()
        );

        let mut actor = QueueActor::new(
            settings,
            store,
            downloader,
            policy,
            receiver,
            sender.downgrade(),
            events.clone(),
        );
        actor.recover().await?;
        tokio::spawn(actor.run());

        Ok(Self { sender, events })
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> QueueCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .await
            .map_err(|_| TubeloaderError::QueueClosed)?;
        Ok(response.await.map_err(|_| TubeloaderError::QueueClosed)?)
    }

    /// Validate, deduplicate and enqueue a batch of URLs.
    ///
    /// Rejected URLs are reported in [`AddOutcome::skipped_urls`]; only a
    /// persistence failure is an error.
    pub async fn add_to_queue(&self, urls: Vec<String>, options: AddOptions) -> Result<AddOutcome> {
        self.request(|reply| QueueCommand::Add {
            urls,
            options,
            reply,
        })
        .await?
    }

    pub async fn get_queue_status(&self) -> Result<QueueSnapshot> {
        self.request(|reply| QueueCommand::Status { reply }).await
    }

    /// Look up one item, archived ones included
    pub async fn get_item(&self, id: &str) -> Result<Option<QueueItem>> {
        self.request(|reply| QueueCommand::GetItem {
            id: id.to_string(),
            reply,
        })
        .await
    }

    pub async fn pause_download(&self, id: &str) -> Result<CommandOutcome> {
        self.request(|reply| QueueCommand::Pause {
            id: id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn resume_download(&self, id: &str) -> Result<CommandOutcome> {
        self.request(|reply| QueueCommand::Resume {
            id: id.to_string(),
            reply,
        })
        .await?
    }

    /// Cancel a queued, paused or running download. Cancelling twice is a no-op.
    pub async fn cancel_download(&self, id: &str) -> Result<CommandOutcome> {
        self.request(|reply| QueueCommand::Cancel {
            id: id.to_string(),
            reply,
        })
        .await?
    }

    /// Re-queue a failed download by hand. Restricted videos are refused.
    pub async fn retry_download(&self, id: &str) -> Result<CommandOutcome> {
        self.request(|reply| QueueCommand::Retry {
            id: id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn clear_completed(&self) -> Result<CommandOutcome> {
        self.request(|reply| QueueCommand::ClearCompleted { reply })
            .await?
    }

    /// Allow the scheduler to launch downloads
    pub async fn start(&self) -> Result<CommandOutcome> {
        self.request(|reply| QueueCommand::Start { reply }).await
    }

    /// Stop launching downloads; running ones continue
    pub async fn stop(&self) -> Result<CommandOutcome> {
        self.request(|reply| QueueCommand::Stop { reply }).await
    }

    /// Subscribe to queue events. Slow subscribers miss events rather than stall the queue.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Stop the actor and cancel running downloads.
    ///
    /// Interrupted items stay `downloading` in the store and come back as `queued`
    /// the next time the queue is opened.
    pub async fn shutdown(&self) {
        if self
            .request(|reply| QueueCommand::Shutdown { reply })
            .await
            .is_ok()
        {
            info!("Download queue shut down");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
