//! Key/value storage capability for tether.
//!
//! The persistence engine never talks to a concrete backend. It consumes the
//! four-method [`StorageEngine`] capability (get, set, remove, list keys), and
//! acquires it once per bootstrap through a [`StorageProvider`].
//!
//! # Backends
//!
//! - [`InMemoryStorage`] -- `BTreeMap`-based store with an operation journal,
//!   for tests and embedding
//! - [`TimeoutStorage`] -- wraps any backend and bounds every call with a
//!   deadline
//!
//! # Design Rules
//!
//! 1. Values are opaque UTF-8 text; the engine writes JSON.
//! 2. `Ok(None)` from `get_item` means "no record", never an error.
//! 3. All backend failures are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod timeout;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryStorage, StorageOp};
pub use timeout::TimeoutStorage;
pub use traits::{provider_fn, ProviderFn, StorageEngine, StorageProvider};
