// In-memory QueueRepository (no durability)
//
// Stores the same encoded envelopes a durable adapter would, so the record
// codec is exercised on every round trip.

use crate::domain::codec;
use crate::domain::{DeadLetterItem, ItemId, QueueConfig, QueueItem};
use crate::error::Result;
use crate::port::QueueRepository;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryQueueRepository {
    items: RwLock<HashMap<String, BTreeMap<ItemId, String>>>,
    configs: RwLock<BTreeMap<String, QueueConfig>>,
    dead_letters: RwLock<VecDeque<(ItemId, String)>>,
}

impl InMemoryQueueRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw (possibly legacy) record, bypassing the encoder
    pub async fn insert_raw_item(&self, queue: &str, item_id: &str, raw: impl Into<String>) {
        self.items
            .write()
            .await
            .entry(queue.to_string())
            .or_default()
            .insert(item_id.to_string(), raw.into());
    }

    pub async fn item_count(&self, queue: &str) -> usize {
        self.items.read().await.get(queue).map_or(0, |q| q.len())
    }

    pub async fn dead_letter_count(&self) -> usize {
        self.dead_letters.read().await.len()
    }
}

#[async_trait]
impl QueueRepository for InMemoryQueueRepository {
    async fn load_queue_items(&self, queue: &str) -> Result<Vec<QueueItem>> {
        let items = self.items.read().await;
        let Some(records) = items.get(queue) else {
            return Ok(Vec::new());
        };
        records
            .values()
            .map(|raw| codec::decode_item(raw).map_err(Into::into))
            .collect()
    }

    async fn save_queue_item(&self, queue: &str, item: &QueueItem) -> Result<()> {
        let raw = codec::encode_item(item)?;
        self.items
            .write()
            .await
            .entry(queue.to_string())
            .or_default()
            .insert(item.id.clone(), raw);
        Ok(())
    }

    async fn delete_queue_item(&self, queue: &str, item_id: &ItemId) -> Result<()> {
        if let Some(records) = self.items.write().await.get_mut(queue) {
            records.remove(item_id);
        }
        Ok(())
    }

    async fn clear_queue_items(&self, queue: &str) -> Result<u64> {
        let removed = self
            .items
            .write()
            .await
            .remove(queue)
            .map_or(0, |records| records.len());
        Ok(removed as u64)
    }

    async fn load_configs(&self) -> Result<Vec<QueueConfig>> {
        Ok(self.configs.read().await.values().cloned().collect())
    }

    async fn save_config(&self, config: &QueueConfig) -> Result<()> {
        self.configs
            .write()
            .await
            .insert(config.name.clone(), config.clone());
        Ok(())
    }

    async fn load_dead_letter_items(&self) -> Result<Vec<DeadLetterItem>> {
        self.dead_letters
            .read()
            .await
            .iter()
            .map(|(_, raw)| codec::decode_dead_letter(raw).map_err(Into::into))
            .collect()
    }

    async fn append_dead_letter_item(&self, item: &DeadLetterItem, capacity: usize) -> Result<()> {
        let raw = codec::encode_dead_letter(item)?;
        let mut dead_letters = self.dead_letters.write().await;
        dead_letters.push_back((item.item.id.clone(), raw));
        while dead_letters.len() > capacity {
            dead_letters.pop_front();
        }
        Ok(())
    }

    async fn remove_dead_letter_item(&self, item_id: &ItemId) -> Result<()> {
        self.dead_letters
            .write()
            .await
            .retain(|(id, _)| id != item_id);
        Ok(())
    }

    async fn purge_dead_letter_items(&self) -> Result<u64> {
        let mut dead_letters = self.dead_letters.write().await;
        let count = dead_letters.len() as u64;
        dead_letters.clear();
        Ok(count)
    }
}
