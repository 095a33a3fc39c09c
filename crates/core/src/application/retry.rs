// Retry manager: retry vs. dead-letter decision and backoff
use crate::domain::{QueueConfig, QueueItem};
use crate::port::DeliveryError;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue, eligible again after `delay_ms`
    Retry { delay_ms: i64 },
    /// Move to the dead-letter store (or discard when disabled)
    DeadLetter,
}

/// Linear backoff retry policy
///
/// `attempts` counts failed deliveries. After the n-th failure the item
/// becomes eligible again `retry_base_delay_ms * n` later. Non-retryable
/// errors dead-letter immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetryPolicy;

impl RetryPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Record the failure on the item and decide what happens next
    ///
    /// The error is appended to `error_history` before deciding, so an item
    /// exhausted by retryable errors leaves with `retry_attempts + 1` entries.
    pub fn apply(
        &self,
        item: &mut QueueItem,
        error: &DeliveryError,
        config: &QueueConfig,
        now_millis: i64,
    ) -> RetryDecision {
        item.record_failure(&error.code, &error.message, error.retryable, now_millis);

        if !error.retryable {
            warn!(
                queue = %config.name,
                item_id = %item.id,
                code = %error.code,
                "Non-retryable delivery error"
            );
            return RetryDecision::DeadLetter;
        }

        if item.attempts > config.retry_attempts {
            warn!(
                queue = %config.name,
                item_id = %item.id,
                attempts = item.attempts,
                retry_attempts = config.retry_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::DeadLetter;
        }

        let delay_ms = self.backoff_ms(config, item.attempts);
        info!(
            queue = %config.name,
            item_id = %item.id,
            attempt = item.attempts,
            delay_ms,
            code = %error.code,
            "Scheduling retry"
        );
        RetryDecision::Retry { delay_ms }
    }

    /// delay = base * attempts
    pub fn backoff_ms(&self, config: &QueueConfig, attempts: u32) -> i64 {
        config
            .retry_base_delay_ms
            .saturating_mul(i64::from(attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Channel, Notification, PriorityClass};

    fn config(retry_attempts: u32) -> QueueConfig {
        let mut c = QueueConfig::default_for(Channel::Email, PriorityClass::Critical);
        c.retry_attempts = retry_attempts;
        c.retry_base_delay_ms = 1000;
        c
    }

    fn item() -> QueueItem {
        QueueItem::new(
            "item-1",
            Notification::email_test("n-1", PriorityClass::Critical),
            4,
            0,
        )
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::new();
        let config = config(3);
        let mut item = item();
        let timeout = DeliveryError::timeout(10);

        assert_eq!(
            policy.apply(&mut item, &timeout, &config, 0),
            RetryDecision::Retry { delay_ms: 1000 }
        );
        assert_eq!(
            policy.apply(&mut item, &timeout, &config, 0),
            RetryDecision::Retry { delay_ms: 2000 }
        );
        assert_eq!(
            policy.apply(&mut item, &timeout, &config, 0),
            RetryDecision::Retry { delay_ms: 3000 }
        );
    }

    #[test]
    fn test_exhaustion_leaves_retry_attempts_plus_one_errors() {
        let policy = RetryPolicy::new();
        let config = config(1);
        let mut item = item();
        let timeout = DeliveryError::timeout(10);

        assert!(matches!(
            policy.apply(&mut item, &timeout, &config, 0),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(
            policy.apply(&mut item, &timeout, &config, 0),
            RetryDecision::DeadLetter
        );
        assert_eq!(item.error_history.len(), 2);
        assert_eq!(item.attempts, 2);
    }

    #[test]
    fn test_non_retryable_dead_letters_immediately() {
        let policy = RetryPolicy::new();
        let config = config(5);
        let mut item = item();
        let error = DeliveryError::new("UNSUBSCRIBED", "user opted out");

        assert_eq!(
            policy.apply(&mut item, &error, &config, 0),
            RetryDecision::DeadLetter
        );
        assert_eq!(item.error_history.len(), 1);
        assert!(!item.error_history[0].retryable);
    }

    #[test]
    fn test_zero_retry_attempts() {
        let policy = RetryPolicy::new();
        let mut item = item();
        assert_eq!(
            policy.apply(&mut item, &DeliveryError::uncoded("boom"), &config(0), 0),
            RetryDecision::DeadLetter
        );
    }
}
