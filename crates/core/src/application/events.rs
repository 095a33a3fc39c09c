// Engine events (observer pattern over a bounded broadcast channel)
//
// Events are published while the owning queue's mutex is held, so per-queue
// event order matches the order of state transitions.

use crate::domain::Channel;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    ItemEnqueued {
        queue: String,
        item_id: String,
        notification_id: String,
    },
    NotificationDelivered {
        queue: String,
        item_id: String,
        notification_id: String,
        attempts: u32,
    },
    RetryScheduled {
        queue: String,
        item_id: String,
        attempt: u32,
        next_eligible_at: i64,
    },
    ItemMovedToDlq {
        queue: String,
        item_id: String,
        notification_id: String,
        error_code: String,
    },
    ItemDiscarded {
        queue: String,
        item_id: String,
        notification_id: String,
    },
    BatchProcessed {
        batch_id: String,
        channel: Channel,
        total: usize,
        successful: usize,
        failed: usize,
    },
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::ItemEnqueued { .. } => "itemEnqueued",
            QueueEvent::NotificationDelivered { .. } => "notificationDelivered",
            QueueEvent::RetryScheduled { .. } => "retryScheduled",
            QueueEvent::ItemMovedToDlq { .. } => "itemMovedToDLQ",
            QueueEvent::ItemDiscarded { .. } => "itemDiscarded",
            QueueEvent::BatchProcessed { .. } => "batchProcessed",
        }
    }
}

/// Publisher side of the event stream
pub struct EventBus {
    tx: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: QueueEvent) {
        trace!(event = event.name(), "Publishing engine event");
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }
}
