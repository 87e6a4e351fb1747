//! Slot accounting and next-to-start selection

use tracing::debug;

use crate::queue::models::QueueStatus;
use crate::queue::state::QueueState;

/// Decides which queued items may start.
///
/// The scheduler only picks ids; the queue actor performs the transition, so slot
/// allocation stays on the actor's single decision path.
#[derive(Debug, Clone)]
pub struct Scheduler {
    max_concurrent: usize,
    running: bool,
}

impl Scheduler {
    pub fn new(max_concurrent: usize, running: bool) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            running,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn available_slots(&self, state: &QueueState) -> usize {
        self.max_concurrent
            .saturating_sub(state.count(QueueStatus::Downloading))
    }

    /// Ids of the queued items to start now, in start order
    pub fn next_batch(&self, state: &QueueState) -> Vec<String> {
        if !self.running {
            return Vec::new();
        }

        let slots = self.available_slots(state);
        if slots == 0 {
            return Vec::new();
        }

        let batch: Vec<String> = state
            .queued_in_order()
            .into_iter()
            .take(slots)
            .map(|item| item.id.clone())
            .collect();

        if !batch.is_empty() {
            debug!("Scheduler filling {} of {} free slot(s)", batch.len(), slots);
        }
        batch
    }
}
