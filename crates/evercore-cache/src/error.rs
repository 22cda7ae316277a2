//! Error taxonomy for the SQLite-backed adapters

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    #[error("failed to serialize or deserialize stored value: {0}")]
    SerializationError(String),

    #[error("database query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),
}
