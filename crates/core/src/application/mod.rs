// Application Layer - Use Cases and Business Logic

mod batch;
pub mod dispatcher;
pub mod engine;
pub mod events;
pub mod recovery;
pub mod registry;
pub mod retry;

// Re-exports
pub use dispatcher::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use engine::{EngineSettings, EnqueueOptions, QueueEngine};
pub use events::QueueEvent;
pub use recovery::{RecoveryReport, RecoveryService};
pub use retry::{RetryDecision, RetryPolicy};
