pub mod actor;
pub mod admission;
pub mod classifier;
pub mod events;
pub mod manager;
pub mod messages;
pub mod models;
pub mod retry;
pub mod scheduler;
pub mod state;

pub use admission::{extract_video_id, AdmissionController, AdmissionDecision};
pub use classifier::{classify_error, ErrorClassifier, ErrorKind};
pub use events::QueueEvent;
pub use manager::QueueManager;
pub use models::{
    AddOptions, AddOutcome, CommandOutcome, QueueItem, QueueSnapshot, QueueStats, QueueStatus,
    SkipReason, SkippedUrl,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::Scheduler;
pub use state::QueueState;
