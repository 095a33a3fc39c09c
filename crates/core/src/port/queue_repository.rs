// Queue Repository Port (Interface)

use crate::domain::{DeadLetterItem, ItemId, QueueConfig, QueueItem};
use crate::error::Result;
use async_trait::async_trait;

/// Durable storage for configs, live items and dead letters.
///
/// The engine keeps its own in-memory view and mirrors every transition
/// here; implementations only need to be a key-value/list store.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Load all live items of a queue (any order)
    async fn load_queue_items(&self, queue: &str) -> Result<Vec<QueueItem>>;

    /// Insert or replace a live item
    async fn save_queue_item(&self, queue: &str, item: &QueueItem) -> Result<()>;

    /// Remove a live item (delivered, dead-lettered or cleared)
    async fn delete_queue_item(&self, queue: &str, item_id: &ItemId) -> Result<()>;

    /// Remove every live item of a queue, returning the count removed
    async fn clear_queue_items(&self, queue: &str) -> Result<u64>;

    /// Load all persisted queue configs
    async fn load_configs(&self) -> Result<Vec<QueueConfig>>;

    /// Insert or replace a queue config
    async fn save_config(&self, config: &QueueConfig) -> Result<()>;

    /// Load dead letters, oldest first
    async fn load_dead_letter_items(&self) -> Result<Vec<DeadLetterItem>>;

    /// Append a dead letter, keeping at most `capacity` (oldest dropped first)
    async fn append_dead_letter_item(&self, item: &DeadLetterItem, capacity: usize) -> Result<()>;

    /// Remove one dead letter (reprocessing)
    async fn remove_dead_letter_item(&self, item_id: &ItemId) -> Result<()>;

    /// Remove every dead letter, returning the count removed
    async fn purge_dead_letter_items(&self) -> Result<u64>;
}
