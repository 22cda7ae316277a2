//! Error taxonomy for the download/upload pipelines

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation canceled")]
    OperationCanceled,

    #[error("tag graph has a cycle: {0}")]
    CyclicTagGraph(String),

    #[error("runtime error: {0}")]
    RuntimeError(String),
}

impl From<evercore_core::error::CoreError> for SyncError {
    fn from(err: evercore_core::error::CoreError) -> Self {
        use evercore_core::error::CoreError;
        match err {
            CoreError::InvalidArgument(msg) => SyncError::InvalidArgument(msg),
            CoreError::OperationCanceled => SyncError::OperationCanceled,
            CoreError::Protocol(p) => SyncError::RuntimeError(p.to_string()),
            CoreError::RuntimeError(msg) => SyncError::RuntimeError(msg),
        }
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::RuntimeError(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
