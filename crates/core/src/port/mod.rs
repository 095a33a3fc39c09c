// Port Layer - Interfaces for external dependencies

pub mod delivery_handler;
pub mod id_provider; // For deterministic testing
pub mod memory;
pub mod queue_repository;
pub mod time_provider;

// Re-exports
pub use delivery_handler::{DeliveryError, DeliveryHandler, NON_RETRYABLE_CODES};
pub use id_provider::IdProvider;
pub use memory::InMemoryQueueRepository;
pub use queue_repository::QueueRepository;
pub use time_provider::TimeProvider;
