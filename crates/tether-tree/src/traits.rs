//! The [`ObservableTree`] trait defining the container interface.
//!
//! Any mutation-tracking technology (explicit setters, dirty checking,
//! structural sharing) implements this trait to be persisted.

use tether_types::{ChangeOp, Mutation, Snapshot};

use crate::error::TreeResult;
use crate::subscription::Subscription;

/// One applied batch of changes.
#[derive(Clone, Debug)]
pub struct TreeChange {
    /// The changes, in application order.
    pub ops: Vec<ChangeOp>,
    /// The root snapshot after the batch.
    pub root: Snapshot,
}

impl TreeChange {
    /// Returns `true` if every change in the batch lands inside `field`.
    pub fn only_touches_field(&self, field: &str) -> bool {
        self.ops.iter().all(|op| op.targets_field(field))
    }
}

/// Callback for the whole-tree change feed.
pub type AllChangesCallback = Box<dyn Fn(&TreeChange) + Send + Sync>;

/// Callback for a single field; receives the field's new value, or `None`
/// once the field is gone.
pub type FieldChangeCallback = Box<dyn Fn(Option<&Snapshot>) + Send + Sync>;

/// Mutable object graph with snapshot and subscription support.
///
/// Implementations must be thread-safe (`Send + Sync`) and must:
/// - deliver each applied batch to whole-tree subscribers exactly once, in
///   commit order, even when batches are applied from several threads;
/// - notify a field subscriber whenever a batch changes the field itself, a
///   value beneath it, or one of its ancestors;
/// - never invoke callbacks while holding internal locks, so callbacks may
///   read or mutate the tree.
pub trait ObservableTree: Send + Sync {
    /// Immutable copy of the whole tree.
    fn snapshot(&self) -> Snapshot;

    /// Apply `mutations` as one batch. Either every mutation applies or none
    /// does. Returns the changes that took effect.
    fn apply(&self, mutations: Vec<Mutation>) -> TreeResult<Vec<ChangeOp>>;

    /// Subscribe to every applied batch.
    fn subscribe_all(&self, callback: AllChangesCallback) -> Subscription;

    /// Subscribe to changes of `key` on the object at `parent`.
    fn subscribe_key(&self, parent: &[String], key: &str, callback: FieldChangeCallback)
        -> Subscription;

    /// Immutable copy of the value at `path`.
    fn get(&self, path: &[String]) -> Option<Snapshot> {
        self.snapshot().get_path(path).cloned()
    }

    /// Replace the value at `path`.
    fn set(&self, path: &[String], value: Snapshot) -> TreeResult<()> {
        self.apply(vec![Mutation::Set {
            path: path.to_vec(),
            value,
        }])
        .map(|_| ())
    }

    /// Remove the value at `path`. Returns `true` if it existed.
    fn remove(&self, path: &[String]) -> TreeResult<bool> {
        let ops = self.apply(vec![Mutation::Remove {
            path: path.to_vec(),
        }])?;
        Ok(!ops.is_empty())
    }
}
