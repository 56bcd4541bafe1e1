//! Diff engine for tether.
//!
//! Compares two object snapshots key by key and reports which top-level keys
//! were added, removed, or updated. Values are compared by identity, not by
//! content: a key is updated when its snapshot handle changed.
//!
//! # Key Types
//!
//! - [`ObjectDiff`] / [`KeyChange`] -- Added, removed, and updated keys

pub mod object_diff;

pub use object_diff::{diff_objects, diff_snapshots, KeyChange, ObjectDiff};
