// Queue Metrics (cache, not authoritative state)

use serde::{Deserialize, Serialize};

/// Per-queue counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub queue: String,
    pub size: usize,
    pub processing: usize,
    pub enqueued: u64,
    pub processed: u64,
    pub failed: u64,
    pub retried: u64,
    pub error_rate: f64,
    pub last_processed_at: Option<i64>,
}

impl QueueMetrics {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Default::default()
        }
    }

    pub fn record_enqueued(&mut self) {
        self.enqueued += 1;
    }

    pub fn record_processed(&mut self, now_millis: i64) {
        self.processed += 1;
        self.last_processed_at = Some(now_millis);
        self.recompute_error_rate();
    }

    pub fn record_retry(&mut self) {
        self.retried += 1;
    }

    pub fn record_failed(&mut self, now_millis: i64) {
        self.failed += 1;
        self.last_processed_at = Some(now_millis);
        self.recompute_error_rate();
    }

    fn recompute_error_rate(&mut self) {
        let total = self.processed + self.failed;
        self.error_rate = if total == 0 {
            0.0
        } else {
            self.failed as f64 / total as f64
        };
    }
}
