//! Foundation types for tether.
//!
//! tether keeps an observable in-memory object tree synchronized with a
//! key/value storage backend. This crate holds the vocabulary every other
//! tether crate shares.
//!
//! # Key Types
//!
//! - [`Snapshot`] -- Immutable, reference-counted JSON node with structural sharing
//! - [`ChangeOp`] / [`Mutation`] -- Ordered tree mutation records
//! - [`DotPath`] -- Validated dot-separated path into the tree
//! - [`KeyScheme`] -- Storage key naming for records, per-key records, and the meta record
//! - [`Strategy`] -- Per-path storage layout (single record or one record per key)

pub mod change;
pub mod error;
pub mod key;
pub mod path;
pub mod snapshot;
pub mod strategy;

pub use change::{ChangeKind, ChangeOp, Mutation};
pub use error::{TypesError, TypesResult};
pub use key::{KeyScheme, STATUS_FIELD};
pub use path::DotPath;
pub use snapshot::{Node, Snapshot};
pub use strategy::Strategy;
