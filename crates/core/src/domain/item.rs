// Queue Item Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::notification::Notification;
use serde::{Deserialize, Serialize};

/// Queue item ID (UUID v4)
pub type ItemId = String;

/// Item lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    Queued,
    Processing,
    Delivered,
    DeadLettered,
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemState::Queued => write!(f, "QUEUED"),
            ItemState::Processing => write!(f, "PROCESSING"),
            ItemState::Delivered => write!(f, "DELIVERED"),
            ItemState::DeadLettered => write!(f, "DEAD_LETTERED"),
        }
    }
}

/// One failed delivery attempt, as recorded in the item's error history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub attempt: u32,
    pub occurred_at: i64,
}

/// Queue Item Entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub notification: Notification,
    pub priority: i32,
    pub state: ItemState,
    pub attempts: u32,
    pub next_eligible_at: Option<i64>,
    pub error_history: Vec<ErrorRecord>,
    pub added_at: i64, // epoch ms
    /// Tie-breaker for items added within the same millisecond
    #[serde(default)]
    pub sequence: u64,
    pub processing_started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl QueueItem {
    /// Create a new queued item
    ///
    /// # Arguments
    ///
    /// * `id` - Unique item ID (injected, not generated)
    /// * `notification` - Notification to deliver
    /// * `priority` - Numeric priority weight
    /// * `added_at` - Insertion timestamp in epoch ms (injected, not system time)
    pub fn new(
        id: impl Into<String>,
        notification: Notification,
        priority: i32,
        added_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            notification,
            priority,
            state: ItemState::Queued,
            attempts: 0,
            next_eligible_at: None,
            error_history: Vec::new(),
            added_at,
            sequence: 0,
            processing_started_at: None,
            completed_at: None,
        }
    }

    /// Eligible for dispatch at `now_millis` (ignores in-flight tracking)
    pub fn is_eligible(&self, now_millis: i64) -> bool {
        self.state == ItemState::Queued
            && self.next_eligible_at.map_or(true, |at| at <= now_millis)
    }

    /// Transition to Processing with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.state != ItemState::Queued {
            return Err(self.invalid_transition(ItemState::Processing));
        }
        self.state = ItemState::Processing;
        self.processing_started_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Delivered with explicit timestamp
    pub fn complete(&mut self, now_millis: i64) -> Result<()> {
        if self.state != ItemState::Processing {
            return Err(self.invalid_transition(ItemState::Delivered));
        }
        self.state = ItemState::Delivered;
        self.completed_at = Some(now_millis);
        Ok(())
    }

    /// Back to Queued, not eligible before `eligible_at`
    pub fn schedule_retry(&mut self, now_millis: i64, eligible_at: i64) -> Result<()> {
        if self.state != ItemState::Processing {
            return Err(self.invalid_transition(ItemState::Queued));
        }
        self.state = ItemState::Queued;
        self.next_eligible_at = Some(eligible_at);
        self.completed_at = Some(now_millis);
        Ok(())
    }

    /// Freeze as dead-lettered with explicit timestamp
    pub fn dead_letter(&mut self, now_millis: i64) -> Result<()> {
        if self.state != ItemState::Processing {
            return Err(self.invalid_transition(ItemState::DeadLettered));
        }
        self.state = ItemState::DeadLettered;
        self.completed_at = Some(now_millis);
        Ok(())
    }

    /// Record a failed attempt (attempts counts failed deliveries)
    pub fn record_failure(&mut self, code: &str, message: &str, retryable: bool, now_millis: i64) {
        self.attempts += 1;
        self.error_history.push(ErrorRecord {
            code: code.to_string(),
            message: message.to_string(),
            retryable,
            attempt: self.attempts,
            occurred_at: now_millis,
        });
    }

    /// Reset for a fresh delivery cycle (dead-letter reprocessing)
    pub fn reset_for_reprocess(&mut self) {
        self.state = ItemState::Queued;
        self.attempts = 0;
        self.error_history.clear();
        self.next_eligible_at = None;
        self.processing_started_at = None;
        self.completed_at = None;
    }

    /// Ordering key: descending priority, then ascending insertion time
    pub fn order_key(&self) -> (std::cmp::Reverse<i32>, i64, u64) {
        (std::cmp::Reverse(self.priority), self.added_at, self.sequence)
    }

    fn invalid_transition(&self, to: ItemState) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}

/// A queue item frozen at dead-lettering time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterItem {
    pub item: QueueItem,
    pub queue: String,
    pub dead_lettered_at: i64,
}

impl DeadLetterItem {
    pub fn id(&self) -> &str {
        &self.item.id
    }

    /// Code of the error that sent the item here
    pub fn last_error_code(&self) -> Option<&str> {
        self.item.error_history.last().map(|e| e.code.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriorityClass;

    fn item() -> QueueItem {
        QueueItem::new(
            "item-1",
            Notification::email_test("n-1", PriorityClass::High),
            3,
            1000,
        )
    }

    #[test]
    fn test_item_lifecycle() {
        let mut item = item();
        assert_eq!(item.state, ItemState::Queued);
        assert!(item.is_eligible(1000));

        item.start(2000).unwrap();
        assert_eq!(item.state, ItemState::Processing);
        assert_eq!(item.processing_started_at, Some(2000));
        assert!(!item.is_eligible(2000));

        item.complete(3000).unwrap();
        assert_eq!(item.state, ItemState::Delivered);
        assert_eq!(item.completed_at, Some(3000));
    }

    #[test]
    fn test_invalid_transitions() {
        let mut item = item();
        assert!(item.complete(1).is_err());
        assert!(item.dead_letter(1).is_err());

        item.start(1).unwrap();
        assert!(matches!(
            item.start(2),
            Err(DomainError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_retry_gates_eligibility() {
        let mut item = item();
        item.start(1000).unwrap();
        item.record_failure("TIMEOUT", "timed out", true, 1000);
        item.schedule_retry(1000, 2000).unwrap();

        assert_eq!(item.attempts, 1);
        assert_eq!(item.error_history.len(), 1);
        assert_eq!(item.error_history[0].attempt, 1);
        assert!(!item.is_eligible(1999));
        assert!(item.is_eligible(2000));
    }

    #[test]
    fn test_reset_for_reprocess() {
        let mut item = item();
        item.start(1).unwrap();
        item.record_failure("BLOCKED", "blocked", false, 1);
        item.dead_letter(1).unwrap();

        item.reset_for_reprocess();
        assert_eq!(item.state, ItemState::Queued);
        assert_eq!(item.attempts, 0);
        assert!(item.error_history.is_empty());
        assert!(item.is_eligible(0));
    }
}
