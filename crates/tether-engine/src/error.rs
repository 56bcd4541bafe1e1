use std::sync::Arc;

use tether_store::StorageError;
use tether_tree::TreeError;
use tether_types::TypesError;
use thiserror::Error;

/// Errors produced by the persistence engine.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The configuration cannot be honored. Fatal for the affected path.
    #[error("configuration error for path {path:?}: {reason}")]
    Configuration { path: String, reason: String },

    /// A key listed by the backend had no record when read.
    #[error("storage listed {key:?} but returned no record for it")]
    Consistency { key: String },

    /// A backend call failed. Never retried by the engine itself.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A migration failed; later migrations did not run.
    #[error("migration to version {version} failed: {source}")]
    Migration {
        version: u32,
        #[source]
        source: anyhow::Error,
    },

    /// A record could not be encoded or decoded.
    #[error("serialization error for {key:?}: {reason}")]
    Serialization { key: String, reason: String },

    /// Status may only move out of `loading`, once.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    /// The live tree rejected a mutation.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Types(#[from] TypesError),

    /// `start` was called more than once.
    #[error("engine already started")]
    AlreadyStarted,

    /// The operation needs a started engine.
    #[error("engine not started")]
    NotStarted,

    /// Bootstrap failed; the same error is recorded in the status.
    #[error("bootstrap failed: {0}")]
    Bootstrap(Arc<PersistError>),
}

impl PersistError {
    pub(crate) fn config(path: impl Into<String>, reason: impl Into<String>) -> Self {
        PersistError::Configuration {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the engine crate.
pub type PersistResult<T> = Result<T, PersistError>;
