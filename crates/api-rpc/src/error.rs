//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use notiq_core::error::AppError;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const QUEUE_FULL: i32 = 4002;
    pub const QUEUE_BUSY: i32 = 4003;
    pub const THROTTLED: i32 = 4004;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const PERSISTENCE_ERROR: i32 = 5001;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let message = err.to_string();
    match err {
        AppError::Validation(_) | AppError::Domain(_) | AppError::Serialization(_) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, message, None::<()>)
        }
        AppError::NotFound(_) | AppError::QueueNotFound(_) => {
            ErrorObjectOwned::owned(code::NOT_FOUND, message, None::<()>)
        }
        AppError::QueueFull { queue, max_size } => ErrorObjectOwned::owned(
            code::QUEUE_FULL,
            message,
            Some(serde_json::json!({ "queue": queue, "max_size": max_size })),
        ),
        AppError::QueueBusy { queue, in_flight } => ErrorObjectOwned::owned(
            code::QUEUE_BUSY,
            message,
            Some(serde_json::json!({ "queue": queue, "in_flight": in_flight })),
        ),
        AppError::Persistence(_) => {
            ErrorObjectOwned::owned(code::PERSISTENCE_ERROR, message, None::<()>)
        }
        AppError::Config(_) | AppError::Internal(_) => {
            ErrorObjectOwned::owned(code::INTERNAL_ERROR, message, None::<()>)
        }
    }
}

pub fn throttled() -> ErrorObjectOwned {
    ErrorObjectOwned::owned(
        code::THROTTLED,
        "Rate limit exceeded. Please slow down.",
        None::<()>,
    )
}
