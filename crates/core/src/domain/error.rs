// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid item state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Unknown priority class: {0}")]
    UnknownPriority(String),

    #[error("Unsupported schema version: {0}")]
    UnsupportedSchemaVersion(u32),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
