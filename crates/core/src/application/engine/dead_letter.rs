// Dead-letter store: bounded, oldest evicted first

use crate::domain::DeadLetterItem;
use std::collections::VecDeque;
use tracing::warn;

pub struct DeadLetterStore {
    items: VecDeque<DeadLetterItem>,
    capacity: usize,
    total_entries: u64,
}

impl DeadLetterStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
            total_entries: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a dead letter, returning the evicted entry if the store was full
    pub fn push(&mut self, item: DeadLetterItem) -> Option<DeadLetterItem> {
        let evicted = if self.items.len() >= self.capacity {
            let oldest = self.items.pop_front();
            if let Some(oldest) = &oldest {
                warn!(
                    evicted_item_id = %oldest.item.id,
                    capacity = self.capacity,
                    "Dead-letter store full, evicting oldest entry"
                );
            }
            oldest
        } else {
            None
        };

        self.items.push_back(item);
        self.total_entries += 1;
        evicted
    }

    pub fn remove(&mut self, item_id: &str) -> Option<DeadLetterItem> {
        let pos = self.items.iter().position(|d| d.item.id == item_id)?;
        self.items.remove(pos)
    }

    pub fn get(&self, item_id: &str) -> Option<&DeadLetterItem> {
        self.items.iter().find(|d| d.item.id == item_id)
    }

    /// Most recent entries first
    pub fn recent(&self, limit: usize) -> Vec<DeadLetterItem> {
        self.items.iter().rev().take(limit).cloned().collect()
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.items.iter().any(|d| d.item.id == item_id)
    }

    pub fn clear(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries ever added, including evicted ones
    pub fn total_entries(&self) -> u64 {
        self.total_entries
    }
}
