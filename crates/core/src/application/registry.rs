// Delivery handler registry (channel -> handler)

use crate::domain::Channel;
use crate::port::DeliveryHandler;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<Channel, Arc<dyn DeliveryHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the handler for a channel
    pub async fn register(&self, channel: Channel, handler: Arc<dyn DeliveryHandler>) {
        let replaced = self.handlers.write().await.insert(channel, handler).is_some();
        info!(channel = %channel, replaced, "Delivery handler registered");
    }

    pub async fn get(&self, channel: Channel) -> Option<Arc<dyn DeliveryHandler>> {
        self.handlers.read().await.get(&channel).cloned()
    }

    pub async fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.handlers.read().await.keys().copied().collect();
        channels.sort();
        channels
    }
}
