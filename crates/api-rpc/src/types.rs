//! RPC Request/Response Types
//!
//! Parameters and results of the `queue.*` and `dlq.*` methods.

use notiq_core::domain::{
    BatchDeliveryResult, Channel, DeadLetterItem, Notification, QueueConfig, QueueMetrics,
};
use serde::{Deserialize, Serialize};

/// queue.enqueue.v1 - Enqueue a notification into its channel/priority queue
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub notification: Notification,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub delay_ms: Option<i64>,
    #[serde(default)]
    pub deduplicate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnqueueResponse {
    pub item_id: String,
    pub queue: String,
}

/// queue.process_batch.v1 - Deliver a batch directly, bypassing the queues
#[derive(Debug, Deserialize)]
pub struct ProcessBatchRequest {
    pub channel: Channel,
    pub notifications: Vec<Notification>,
}

pub type ProcessBatchResponse = BatchDeliveryResult;

/// queue.retry.v1 - Make a queued item eligible immediately
#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    pub item_id: String,
    pub queue: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryResponse {
    pub item_id: String,
    pub retried: bool,
}

/// queue.metrics.v1 - One queue, or every queue when `queue` is omitted
#[derive(Debug, Default, Deserialize)]
pub struct MetricsRequest {
    #[serde(default)]
    pub queue: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsResponse {
    pub queues: Vec<QueueMetrics>,
    pub dead_letter_count: usize,
}

/// queue.clear.v1
#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    pub queue: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub queue: String,
    pub removed: usize,
}

/// queue.configure.v1 - Create or replace a queue configuration
#[derive(Debug, Deserialize)]
pub struct ConfigureRequest {
    pub config: QueueConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigureResponse {
    pub config: QueueConfig,
}

/// queue.list.v1
#[derive(Debug, Default, Deserialize)]
pub struct ListQueuesRequest {}

#[derive(Debug, Clone, Serialize)]
pub struct ListQueuesResponse {
    pub queues: Vec<QueueConfig>,
}

/// dlq.list.v1 - Most recent dead letters first
#[derive(Debug, Deserialize)]
pub struct DlqListRequest {
    #[serde(default = "default_dlq_limit")]
    pub limit: usize,
}

fn default_dlq_limit() -> usize {
    100
}

#[derive(Debug, Clone, Serialize)]
pub struct DlqListResponse {
    pub items: Vec<DeadLetterItem>,
    pub total: usize,
}

/// dlq.reprocess.v1
#[derive(Debug, Deserialize)]
pub struct DlqReprocessRequest {
    pub item_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DlqReprocessResponse {
    pub item_id: String,
    pub reprocessed: bool,
}

/// dlq.purge.v1
#[derive(Debug, Default, Deserialize)]
pub struct DlqPurgeRequest {}

#[derive(Debug, Clone, Serialize)]
pub struct DlqPurgeResponse {
    pub removed: usize,
}
