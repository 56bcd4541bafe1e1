//! Persistence engine for tether.
//!
//! Keeps an [`ObservableTree`](tether_tree::ObservableTree) in sync with a
//! key/value [`StorageEngine`](tether_store::StorageEngine): persisted
//! records are loaded on startup, and every later change is queued and
//! written back incrementally.
//!
//! # Key Types
//!
//! - [`PersistEngine`] -- Bootstrap sequence and lifecycle
//! - [`PersistConfig`] -- Name, schema version, strategies, migrations, hooks
//! - [`PathHandler`] -- Load and subscribe logic for one configured path
//! - [`WriteQueue`] -- Last-writer-wins pending writes
//! - [`MigrationRunner`] -- Schema-version migrations
//! - [`PersistStatus`] -- `loading`, `loaded` or `error`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether_engine::{PersistConfig, PersistEngine};
//! use tether_store::{InMemoryStorage, StorageEngine};
//! use tether_tree::MemoryTree;
//! use tether_types::Strategy;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let storage: Arc<dyn StorageEngine> = Arc::new(InMemoryStorage::new());
//! let config = PersistConfig::builder("app")
//!     .version(1)
//!     .initial_state(serde_json::json!({"counter": 0}))
//!     .strategy(Strategy::SingleFile)
//!     .storage(storage)
//!     .build()?;
//! let engine = PersistEngine::new(config, Arc::new(MemoryTree::new(serde_json::json!({}))))?;
//! engine.start().await?;
//! assert!(engine.status().is_loaded());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod migrate;
pub mod queue;
pub mod status;

pub use config::{PersistConfig, PersistConfigBuilder, PersistOptions, Strategies};
pub use engine::PersistEngine;
pub use error::{PersistError, PersistResult};
pub use handler::PathHandler;
pub use hooks::{
    Backoff, BulkFlush, BulkWriteHook, DebouncedBulkWrite, DeferredBulkWrite, ImmediateWrite,
    PendingWrite, RetryPolicy, RetryWrite, SpawnBulkWrite, WriteAction, WriteHook,
};
pub use migrate::{MetaRecord, Migration, MigrationOutcome, MigrationRunner, Migrations};
pub use queue::{FlushReport, WriteQueue};
pub use status::{PersistState, PersistStatus};
