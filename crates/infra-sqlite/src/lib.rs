// Notiq Infrastructure - SQLite Adapter
// Implements: QueueRepository

mod connection;
mod migration;
mod queue_repository;

pub use connection::create_pool;
pub use migration::{current_version, run_migrations};
pub use queue_repository::SqliteQueueRepository;

use notiq_core::error::AppError;

/// Convert sqlx::Error to AppError::Persistence with structured detail.
/// (Orphan rules prevent a `From<sqlx::Error>` impl for AppError here.)
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            // SQLite result codes: https://www.sqlite.org/rescode.html
            Some(code) => {
                let code = code.as_ref();
                let kind = match code {
                    "2067" | "1555" => "Unique constraint violation",
                    "5" => "Database locked (SQLITE_BUSY)",
                    "13" => "Database full",
                    _ => "Database error",
                };
                AppError::Persistence(format!("{} [{}]: {}", kind, code, db_err.message()))
            }
            None => AppError::Persistence(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::RowNotFound => AppError::Persistence("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Persistence(format!("Column not found: {}", col))
        }
        _ => AppError::Persistence(err.to_string()),
    }
}
