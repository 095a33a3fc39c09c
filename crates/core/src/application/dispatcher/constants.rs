// Engine constants (no magic values)
use std::time::Duration;

/// Dead-letter store capacity, oldest dropped first
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 10_000;

/// Upper bound on one handler invocation
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// How long shutdown waits for in-flight deliveries
pub const DEFAULT_SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Parallel deliveries per processBatch chunk
pub const BATCH_CONCURRENCY: usize = 10;

/// Event bus buffer; slow subscribers see `Lagged`
pub const EVENT_BUFFER_SIZE: usize = 1024;

/// Error code when no handler is registered for the item's channel
pub const NO_HANDLER_CODE: &str = "NO_HANDLER";

/// Error code when a handler panicked
pub const HANDLER_PANIC_CODE: &str = "HANDLER_PANIC";
