use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("path segment {segment:?} does not exist")]
    MissingSegment { segment: String },

    #[error("value at {segment:?} is not an object")]
    NotAnObject { segment: String },

    #[error("unknown persistence strategy: {0:?}")]
    UnknownStrategy(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for type-level results.
pub type TypesResult<T> = Result<T, TypesError>;
