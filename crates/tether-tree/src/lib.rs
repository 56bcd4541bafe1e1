//! Observable object tree for tether.
//!
//! The persistence engine does not implement reactivity. It consumes any
//! container implementing [`ObservableTree`]: a snapshot operation, a feed of
//! ordered change batches for the whole tree, and per-field change
//! notification.
//!
//! # Key Types
//!
//! - [`ObservableTree`] -- The container interface
//! - [`Subscription`] -- Handle that unsubscribes on drop
//! - [`MemoryTree`] -- Copy-on-write implementation with structural sharing
//! - [`ResolvedPath`] -- A dot path validated against the live tree

pub mod error;
pub mod memory;
pub mod resolve;
pub mod subscription;
pub mod traits;

pub use error::{TreeError, TreeResult};
pub use memory::MemoryTree;
pub use resolve::{resolve, ResolvedPath};
pub use subscription::Subscription;
pub use traits::{AllChangesCallback, FieldChangeCallback, ObservableTree, TreeChange};
