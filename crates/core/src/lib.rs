// Notiq Core - Domain Logic, Ports & Queueing Engine
// NO infrastructure dependencies (hexagonal architecture)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use application::{EngineSettings, EnqueueOptions, QueueEngine, QueueEvent};
pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
