use tether_types::TypesError;
use thiserror::Error;

/// Errors from tree operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// An intermediate segment of a path is absent from the tree.
    #[error("path {path:?}: segment {segment:?} does not exist")]
    MissingParent { path: String, segment: String },

    /// An intermediate segment of a path holds a non-object value.
    #[error("path {path:?}: segment {segment:?} is not an object")]
    NotAnObject { path: String, segment: String },

    /// A mutation was rejected by the snapshot layer.
    #[error(transparent)]
    Types(#[from] TypesError),
}

/// Convenience alias for tree results.
pub type TreeResult<T> = Result<T, TreeError>;
