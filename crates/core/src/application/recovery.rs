// Startup recovery of persisted queue items
use crate::domain::{DeadLetterItem, ItemState, QueueConfig, QueueItem};
use crate::port::{QueueRepository, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of recovering one queue
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Items to load into the live queue, in their previous dispatch order
    pub live: Vec<QueueItem>,
    /// Items found mid-delivery and put back to queued
    pub requeued: usize,
    /// Items that violated the attempts invariant and were dead-lettered
    pub dead_lettered: Vec<DeadLetterItem>,
    /// Rows removed without being loaded (finished or discarded)
    pub dropped: usize,
}

/// Crash recovery service
///
/// On startup, turns whatever a previous process left in storage back into a
/// consistent live queue. Delivery is at-least-once: an item persisted in
/// `Processing` may already have reached its recipient and is delivered again.
pub struct RecoveryService {
    repo: Arc<dyn QueueRepository>,
    time_provider: Arc<dyn TimeProvider>,
    dead_letter_capacity: usize,
}

impl RecoveryService {
    pub fn new(
        repo: Arc<dyn QueueRepository>,
        time_provider: Arc<dyn TimeProvider>,
        dead_letter_capacity: usize,
    ) -> Self {
        Self {
            repo,
            time_provider,
            dead_letter_capacity,
        }
    }

    /// Recover one queue's persisted items
    ///
    /// 1. `Processing` items go back to `Queued` (persisted)
    /// 2. `Delivered` leftovers are deleted
    /// 3. Items past `retry_attempts` (or left `DeadLettered`) move to the
    ///    dead-letter store, or are deleted when dead-lettering is off
    pub async fn recover_queue(&self, config: &QueueConfig) -> crate::error::Result<RecoveryReport> {
        let now = self.time_provider.now_millis();
        let mut items = self.repo.load_queue_items(&config.name).await?;
        items.sort_by(|a, b| {
            (a.added_at, a.sequence, &a.id).cmp(&(b.added_at, b.sequence, &b.id))
        });

        let mut report = RecoveryReport::default();
        for mut item in items {
            match item.state {
                ItemState::Delivered => {
                    self.repo.delete_queue_item(&config.name, &item.id).await?;
                    report.dropped += 1;
                    continue;
                }
                ItemState::Processing => {
                    item.state = ItemState::Queued;
                    item.processing_started_at = None;
                    self.repo.save_queue_item(&config.name, &item).await?;
                    report.requeued += 1;
                    info!(queue = %config.name, item_id = %item.id, "Requeued item interrupted mid-delivery");
                }
                ItemState::Queued | ItemState::DeadLettered => {}
            }

            let exhausted = item.attempts > config.retry_attempts;
            if item.state == ItemState::DeadLettered || exhausted {
                self.repo.delete_queue_item(&config.name, &item.id).await?;
                if !config.dead_letter_enabled {
                    warn!(queue = %config.name, item_id = %item.id, "Dropping exhausted item");
                    report.dropped += 1;
                    continue;
                }

                item.state = ItemState::DeadLettered;
                item.completed_at = Some(now);
                let dead = DeadLetterItem {
                    item,
                    queue: config.name.clone(),
                    dead_lettered_at: now,
                };
                self.repo
                    .append_dead_letter_item(&dead, self.dead_letter_capacity)
                    .await?;
                warn!(
                    queue = %config.name,
                    item_id = %dead.item.id,
                    attempts = dead.item.attempts,
                    "Exhausted item found in live queue, dead-lettered"
                );
                report.dead_lettered.push(dead);
                continue;
            }

            report.live.push(item);
        }

        if report.requeued > 0 || !report.dead_lettered.is_empty() || report.dropped > 0 {
            info!(
                queue = %config.name,
                live = report.live.len(),
                requeued = report.requeued,
                dead_lettered = report.dead_lettered.len(),
                dropped = report.dropped,
                "Queue recovery complete"
            );
        }
        Ok(report)
    }
}
