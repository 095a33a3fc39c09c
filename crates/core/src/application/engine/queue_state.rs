// Per-queue live state: ordered items, in-flight set, metrics cache

use crate::domain::{ItemId, QueueConfig, QueueItem, QueueMetrics};
use std::collections::HashSet;

/// Live state of one queue. Always accessed under the queue's mutex.
pub struct QueueState {
    pub(crate) config: QueueConfig,
    /// Sorted by (priority desc, added_at asc, sequence asc)
    items: Vec<QueueItem>,
    in_flight: HashSet<ItemId>,
    metrics: QueueMetrics,
}

impl QueueState {
    pub fn new(config: QueueConfig) -> Self {
        let metrics = QueueMetrics::new(config.name.clone());
        Self {
            config,
            items: Vec::new(),
            in_flight: HashSet::new(),
            metrics,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.config.max_size
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, item_id: &str) -> bool {
        self.in_flight.contains(item_id)
    }

    /// Insert keeping priority-then-FIFO order (O(n), bounded by max_size)
    pub fn insert(&mut self, item: QueueItem) {
        let key = item.order_key();
        let pos = self.items.partition_point(|existing| existing.order_key() <= key);
        self.items.insert(pos, item);
    }

    pub fn get(&self, item_id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn get_mut(&mut self, item_id: &str) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }

    pub fn find_by_notification(&self, notification_id: &str) -> Option<&QueueItem> {
        self.items
            .iter()
            .find(|i| i.notification.id == notification_id)
    }

    pub fn remove(&mut self, item_id: &str) -> Option<QueueItem> {
        let pos = self.items.iter().position(|i| i.id == item_id)?;
        Some(self.items.remove(pos))
    }

    /// Drop every live item, returning how many were removed.
    /// The in-flight set is left alone; outcomes for cleared items are discarded.
    pub fn clear(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        count
    }

    /// Free in-flight slots for this tick
    pub fn available_slots(&self) -> usize {
        self.config.batch_size.saturating_sub(self.in_flight.len())
    }

    /// Select up to the free in-flight slots of eligible items, in queue order,
    /// moving each to Processing and marking it in flight. Returns snapshots.
    pub fn take_batch(&mut self, now_millis: i64) -> Vec<QueueItem> {
        let slots = self.available_slots();
        if slots == 0 || self.items.is_empty() {
            return Vec::new();
        }

        let mut batch = Vec::with_capacity(slots);
        for item in self.items.iter_mut() {
            if batch.len() == slots {
                break;
            }
            if self.in_flight.contains(&item.id) || !item.is_eligible(now_millis) {
                continue;
            }
            if item.start(now_millis).is_ok() {
                self.in_flight.insert(item.id.clone());
                batch.push(item.clone());
            }
        }
        batch
    }

    /// Release an in-flight slot
    pub fn release(&mut self, item_id: &str) {
        self.in_flight.remove(item_id);
    }

    pub fn metrics_mut(&mut self) -> &mut QueueMetrics {
        &mut self.metrics
    }

    /// Metrics snapshot with live size and processing counts
    pub fn metrics(&self) -> QueueMetrics {
        let mut snapshot = self.metrics.clone();
        snapshot.size = self.items.len();
        snapshot.processing = self.in_flight.len();
        snapshot
    }

    /// Item snapshots in dispatch order
    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    /// Ids of waiting items whose failures exceed the configured retry budget
    pub fn exhausted_ids(&self) -> Vec<ItemId> {
        self.items
            .iter()
            .filter(|i| i.attempts > self.config.retry_attempts && !self.in_flight.contains(&i.id))
            .map(|i| i.id.clone())
            .collect()
    }
}
