//! Unified error handling for the sync client.

use thiserror::Error;

/// Application error type for the client runtime.
///
/// Storage errors are fatal to the operation that hit them and always
/// surface to the caller; network errors never appear here because the
/// replay agent converts them into retry bookkeeping instead.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("engine error: {0}")]
    Engine(#[from] reel_engine::Error),

    #[error("corrupt stored payload: {0}")]
    CorruptPayload(#[from] serde_json::Error),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
