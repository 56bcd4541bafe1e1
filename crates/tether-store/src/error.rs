use std::time::Duration;

/// Errors from storage backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend reported a failure.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// I/O error from the underlying medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The call did not complete within the configured deadline.
    #[error("{op} on {key:?} timed out after {after:?}")]
    Timeout {
        op: &'static str,
        key: Option<String>,
        after: Duration,
    },

    /// The backend could not be acquired.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
