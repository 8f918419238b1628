//! Fire-and-forget notifications about finished work.

use crate::bulk::BulkJobStatus;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunCompleted {
        /// `None` for a run over every rule.
        rule_id: Option<String>,
        artists_processed: usize,
        violations_found: usize,
        fixes_attempted: usize,
        fixes_succeeded: usize,
    },
    BulkJobFinished {
        job_id: String,
        status: BulkJobStatus,
        processed: usize,
        fixed: usize,
        skipped: usize,
        failed: usize,
    },
}

pub trait EventBus: Send + Sync {
    /// Publish without waiting. Having no listeners is not an error.
    fn publish(&self, event: Event);
}

pub struct BroadcastEventBus {
    sender: broadcast::Sender<Event>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventBus for BroadcastEventBus {
    fn publish(&self, event: Event) {
        if self.sender.send(event).is_err() {
            debug!("Event dropped, no subscribers");
        }
    }
}

/// Discards every event.
pub struct NoOpEventBus;

impl EventBus for NoOpEventBus {
    fn publish(&self, _event: Event) {}
}
