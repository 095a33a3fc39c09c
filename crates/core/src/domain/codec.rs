//! Persisted record codec
//!
//! Live items and dead letters are stored as JSON envelopes:
//!
//! ```text
//! {"schema_version": 2, "item": { ...QueueItem... }}
//! {"schema_version": 2, "queue": "email_high", "dead_lettered_at": 1700000000000, "item": {...}}
//! ```
//!
//! Version 1 records (no envelope, flat notification with a `channel` string and
//! a free-form `data` object, `retry_count`, string `errors`) are migrated on read.

use crate::domain::error::{DomainError, Result};
use crate::domain::item::{DeadLetterItem, ErrorRecord, ItemState, QueueItem};
use crate::domain::notification::{ChannelPayload, Notification, PriorityClass};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current on-disk schema version
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

const LEGACY_ERROR_CODE: &str = "LEGACY_ERROR";

#[derive(Serialize)]
struct ItemEnvelopeRef<'a> {
    schema_version: u32,
    item: &'a QueueItem,
}

#[derive(Serialize)]
struct DeadLetterEnvelopeRef<'a> {
    schema_version: u32,
    queue: &'a str,
    dead_lettered_at: i64,
    item: &'a QueueItem,
}

#[derive(Deserialize)]
struct LegacyNotification {
    id: String,
    channel: String,
    #[serde(default = "legacy_priority")]
    priority: String,
    #[serde(default)]
    data: serde_json::Map<String, Value>,
    #[serde(default)]
    created_at: i64,
}

fn legacy_priority() -> String {
    "medium".to_string()
}

#[derive(Deserialize)]
struct LegacyItem {
    id: String,
    notification: LegacyNotification,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    retry_count: u32,
    #[serde(default)]
    next_retry_at: Option<i64>,
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    added_at: i64,
    #[serde(default)]
    processing_started_at: Option<i64>,
    #[serde(default)]
    completed_at: Option<i64>,
}

/// Encode a live item
pub fn encode_item(item: &QueueItem) -> Result<String> {
    serde_json::to_string(&ItemEnvelopeRef {
        schema_version: CURRENT_SCHEMA_VERSION,
        item,
    })
    .map_err(|e| DomainError::MalformedRecord(e.to_string()))
}

/// Encode a dead letter
pub fn encode_dead_letter(dead: &DeadLetterItem) -> Result<String> {
    serde_json::to_string(&DeadLetterEnvelopeRef {
        schema_version: CURRENT_SCHEMA_VERSION,
        queue: &dead.queue,
        dead_lettered_at: dead.dead_lettered_at,
        item: &dead.item,
    })
    .map_err(|e| DomainError::MalformedRecord(e.to_string()))
}

/// Decode a live item, migrating older schema versions
pub fn decode_item(raw: &str) -> Result<QueueItem> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| DomainError::MalformedRecord(e.to_string()))?;

    match schema_version(&value)? {
        1 => migrate_v1(value),
        2 => {
            let item = value
                .get("item")
                .cloned()
                .ok_or_else(|| DomainError::MalformedRecord("missing item".into()))?;
            serde_json::from_value(item).map_err(|e| DomainError::MalformedRecord(e.to_string()))
        }
        v => Err(DomainError::UnsupportedSchemaVersion(v)),
    }
}

/// Decode a dead letter, migrating older schema versions
pub fn decode_dead_letter(raw: &str) -> Result<DeadLetterItem> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| DomainError::MalformedRecord(e.to_string()))?;

    match schema_version(&value)? {
        1 => {
            // v1 dead letters were bare items; the queue is derived from the notification
            let mut item = migrate_v1(value)?;
            item.state = ItemState::DeadLettered;
            let dead_lettered_at = item.completed_at.unwrap_or(item.added_at);
            Ok(DeadLetterItem {
                queue: item.notification.queue_name(),
                item,
                dead_lettered_at,
            })
        }
        2 => {
            let queue = value
                .get("queue")
                .and_then(Value::as_str)
                .ok_or_else(|| DomainError::MalformedRecord("missing queue".into()))?
                .to_string();
            let dead_lettered_at = value
                .get("dead_lettered_at")
                .and_then(Value::as_i64)
                .ok_or_else(|| DomainError::MalformedRecord("missing dead_lettered_at".into()))?;
            let item = value
                .get("item")
                .cloned()
                .ok_or_else(|| DomainError::MalformedRecord("missing item".into()))?;
            let item: QueueItem = serde_json::from_value(item)
                .map_err(|e| DomainError::MalformedRecord(e.to_string()))?;
            Ok(DeadLetterItem {
                item,
                queue,
                dead_lettered_at,
            })
        }
        v => Err(DomainError::UnsupportedSchemaVersion(v)),
    }
}

/// Records without a version field predate the envelope (v1)
fn schema_version(value: &Value) -> Result<u32> {
    match value.get("schema_version") {
        None => Ok(1),
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| DomainError::MalformedRecord(format!("bad schema_version: {}", v))),
    }
}

fn migrate_v1(value: Value) -> Result<QueueItem> {
    let legacy: LegacyItem =
        serde_json::from_value(value).map_err(|e| DomainError::MalformedRecord(e.to_string()))?;

    let channel: crate::domain::Channel = legacy.notification.channel.parse()?;
    let priority: PriorityClass = legacy.notification.priority.parse()?;

    let mut payload = legacy.notification.data;
    payload.insert("channel".into(), Value::String(channel.as_str().to_string()));
    let payload: ChannelPayload = serde_json::from_value(Value::Object(payload))
        .map_err(|e| DomainError::MalformedRecord(format!("v1 payload: {}", e)))?;

    let occurred_at = legacy.completed_at.unwrap_or(legacy.added_at);
    let error_history = legacy
        .errors
        .into_iter()
        .enumerate()
        .map(|(i, message)| ErrorRecord {
            code: LEGACY_ERROR_CODE.to_string(),
            message,
            retryable: true,
            attempt: i as u32 + 1,
            occurred_at,
        })
        .collect();

    Ok(QueueItem {
        id: legacy.id,
        notification: Notification {
            id: legacy.notification.id,
            priority,
            payload,
            metadata: Value::Null,
            created_at: legacy.notification.created_at,
        },
        priority: legacy.priority.unwrap_or_else(|| priority.weight()),
        state: ItemState::Queued,
        attempts: legacy.retry_count,
        next_eligible_at: legacy.next_retry_at,
        error_history,
        added_at: legacy.added_at,
        sequence: 0,
        processing_started_at: legacy.processing_started_at,
        completed_at: legacy.completed_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Channel;
    use serde_json::json;

    #[test]
    fn test_current_version_envelope() {
        let item = QueueItem::new(
            "item-1",
            Notification::email_test("n-1", PriorityClass::Critical),
            4,
            1000,
        );
        let raw = encode_item(&item).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["schema_version"], CURRENT_SCHEMA_VERSION);
        assert_eq!(value["item"]["notification"]["payload"]["channel"], "email");
        assert_eq!(decode_item(&raw).unwrap(), item);
    }

    #[test]
    fn test_v1_item_is_migrated() {
        let raw = json!({
            "id": "legacy-1",
            "notification": {
                "id": "n-legacy",
                "channel": "sms",
                "priority": "high",
                "data": {"phone_number": "+15550100", "text": "hi"},
                "created_at": 5
            },
            "retry_count": 2,
            "next_retry_at": 9000,
            "errors": ["gateway timeout", "gateway timeout"],
            "added_at": 10
        })
        .to_string();

        let item = decode_item(&raw).unwrap();
        assert_eq!(item.notification.channel(), Channel::Sms);
        assert_eq!(item.priority, PriorityClass::High.weight());
        assert_eq!(item.attempts, 2);
        assert_eq!(item.next_eligible_at, Some(9000));
        assert_eq!(item.error_history.len(), 2);
        assert_eq!(item.error_history[1].attempt, 2);
        assert_eq!(item.state, ItemState::Queued);
    }

    #[test]
    fn test_v1_dead_letter_derives_queue() {
        let raw = json!({
            "id": "legacy-2",
            "notification": {
                "id": "n-2",
                "channel": "webhook",
                "priority": "low",
                "data": {"url": "https://example.com/hook", "body": {"k": 1}}
            },
            "errors": ["boom"],
            "added_at": 10,
            "completed_at": 20
        })
        .to_string();

        let dead = decode_dead_letter(&raw).unwrap();
        assert_eq!(dead.queue, "webhook_low");
        assert_eq!(dead.dead_lettered_at, 20);
        assert_eq!(dead.item.state, ItemState::DeadLettered);
    }

    #[test]
    fn test_future_version_rejected() {
        let raw = json!({"schema_version": 99, "item": {}}).to_string();
        assert!(matches!(
            decode_item(&raw),
            Err(DomainError::UnsupportedSchemaVersion(99))
        ));
    }
}
