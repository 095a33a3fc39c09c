// Delivery Result Model

use crate::domain::notification::{Channel, NotificationId};
use crate::port::DeliveryError;
use serde::{Deserialize, Serialize};

/// Outcome of one delivery attempt (never persisted standalone)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub notification_id: NotificationId,
    pub channel: Channel,
    pub delivered_at: Option<i64>,
    pub error: Option<DeliveryError>,
}

impl DeliveryResult {
    pub fn delivered(notification_id: impl Into<String>, channel: Channel, at: i64) -> Self {
        Self {
            success: true,
            notification_id: notification_id.into(),
            channel,
            delivered_at: Some(at),
            error: None,
        }
    }

    pub fn failed(notification_id: impl Into<String>, channel: Channel, error: DeliveryError) -> Self {
        Self {
            success: false,
            notification_id: notification_id.into(),
            channel,
            delivered_at: None,
            error: Some(error),
        }
    }
}

/// Aggregate of a direct (queue-bypassing) batch delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDeliveryResult {
    pub batch_id: String,
    pub total_items: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<DeliveryResult>,
    pub processing_time_ms: i64,
}
