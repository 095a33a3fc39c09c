// Queue Domain Model

use crate::domain::notification::{Channel, PriorityClass};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Queue identifier ("{channel}_{priority}")
pub type QueueName = String;

/// Queue name for a (channel, priority class) pair
pub fn queue_name(channel: Channel, priority: PriorityClass) -> QueueName {
    format!("{}_{}", channel.as_str(), priority.as_str())
}

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: QueueName,
    pub channel: Channel,
    pub priority_class: PriorityClass,
    pub max_size: usize,
    pub processing_rate_per_second: u32,
    pub batch_size: usize,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: i64,
    pub dead_letter_enabled: bool,
}

impl QueueConfig {
    /// Default configuration for a (channel, priority class) pair.
    ///
    /// Critical queues run fast with small batches; low-priority queues run
    /// slower with larger batches and fewer retries.
    pub fn default_for(channel: Channel, priority_class: PriorityClass) -> Self {
        let (rate, batch, max_size, retries, base_delay_ms) = match priority_class {
            PriorityClass::Critical => (200, 5, 10_000, 5, 1_000),
            PriorityClass::High => (100, 10, 50_000, 3, 2_000),
            PriorityClass::Medium => (50, 20, 100_000, 3, 5_000),
            PriorityClass::Low => (10, 50, 200_000, 2, 10_000),
        };

        Self {
            name: queue_name(channel, priority_class),
            channel,
            priority_class,
            max_size,
            processing_rate_per_second: rate,
            batch_size: batch,
            retry_attempts: retries,
            retry_base_delay_ms: base_delay_ms,
            dead_letter_enabled: true,
        }
    }

    /// Defaults for every channel x priority class combination
    pub fn defaults() -> Vec<Self> {
        Channel::ALL
            .iter()
            .flat_map(|channel| {
                PriorityClass::ALL
                    .iter()
                    .map(move |priority| Self::default_for(*channel, *priority))
            })
            .collect()
    }

    /// Validate config invariants
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("queue name must not be empty".into()));
        }
        let expected = queue_name(self.channel, self.priority_class);
        if self.name != expected {
            return Err(AppError::Validation(format!(
                "queue {}: name must be {} for channel {} and priority {}",
                self.name,
                expected,
                self.channel.as_str(),
                self.priority_class.as_str()
            )));
        }
        if self.max_size == 0 {
            return Err(AppError::Validation(format!(
                "queue {}: max_size must be > 0",
                self.name
            )));
        }
        if self.processing_rate_per_second == 0 {
            return Err(AppError::Validation(format!(
                "queue {}: processing_rate_per_second must be > 0",
                self.name
            )));
        }
        if self.batch_size == 0 {
            return Err(AppError::Validation(format!(
                "queue {}: batch_size must be > 0",
                self.name
            )));
        }
        if self.retry_base_delay_ms < 0 {
            return Err(AppError::Validation(format!(
                "queue {}: retry_base_delay_ms must not be negative",
                self.name
            )));
        }
        Ok(())
    }

    /// Dispatcher wake-up interval in milliseconds (floor 10ms)
    pub fn tick_interval_ms(&self) -> u64 {
        let rate = u64::from(self.processing_rate_per_second.max(1));
        (1000 / rate).max(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_pair() {
        let defaults = QueueConfig::defaults();
        assert_eq!(defaults.len(), 20);
        assert!(defaults.iter().any(|c| c.name == "email_critical"));
        assert!(defaults.iter().any(|c| c.name == "in_app_low"));
        assert!(defaults.iter().all(|c| c.validate().is_ok()));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = QueueConfig::default_for(Channel::Email, PriorityClass::High);
        config.batch_size = 0;
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));

        let mut config = QueueConfig::default_for(Channel::Email, PriorityClass::High);
        config.max_size = 0;
        assert!(config.validate().is_err());

        let mut config = QueueConfig::default_for(Channel::Email, PriorityClass::High);
        config.processing_rate_per_second = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_name_mismatch() {
        let mut renamed = QueueConfig::default_for(Channel::Email, PriorityClass::Critical);
        renamed.name = "custom_q".to_string();
        assert!(matches!(renamed.validate(), Err(AppError::Validation(_))));

        let mut rerouted = QueueConfig::default_for(Channel::Email, PriorityClass::Low);
        rerouted.channel = Channel::Sms;
        assert!(matches!(rerouted.validate(), Err(AppError::Validation(_))));

        let mut reprioritized = QueueConfig::default_for(Channel::Email, PriorityClass::Low);
        reprioritized.priority_class = PriorityClass::High;
        assert!(reprioritized.validate().is_err());
    }

    #[test]
    fn test_tick_interval() {
        let mut config = QueueConfig::default_for(Channel::Sms, PriorityClass::Critical);
        assert_eq!(config.tick_interval_ms(), 10); // 200/s -> 5ms, floored at 10
        config.processing_rate_per_second = 10;
        assert_eq!(config.tick_interval_ms(), 100);
    }
}
