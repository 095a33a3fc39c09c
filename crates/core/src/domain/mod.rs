// Domain Layer - Pure business logic and entities

pub mod codec;
pub mod delivery;
pub mod error;
pub mod item;
pub mod metrics;
pub mod notification;
pub mod queue;

// Re-exports
pub use delivery::{BatchDeliveryResult, DeliveryResult};
pub use error::DomainError;
pub use item::{DeadLetterItem, ErrorRecord, ItemId, ItemState, QueueItem};
pub use metrics::QueueMetrics;
pub use notification::{Channel, ChannelPayload, Notification, NotificationId, PriorityClass};
pub use queue::{QueueConfig, QueueName};
