//! Per-path strategy handlers.
//!
//! Each configured path gets one [`PathHandler`]. It loads the path's
//! persisted records into the live tree, then subscribes to the tree so that
//! later changes are queued for writing.
//!
//! - `SingleFile` stores the whole value at the path under one key.
//! - `MultiFile` stores each top-level key of an object under its own key
//!   and uses the diff to write only the keys that changed.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::try_join_all;
use tether_diff::diff_snapshots;
use tether_store::StorageEngine;
use tether_tree::{resolve, ObservableTree, ResolvedPath, Subscription, TreeChange};
use tether_types::{DotPath, KeyScheme, Mutation, Snapshot, Strategy, STATUS_FIELD};
use tracing::debug;

use crate::error::{PersistError, PersistResult};
use crate::hooks::{BulkFlush, BulkWriteHook};
use crate::queue::WriteQueue;

/// Loads and watches one configured path.
#[derive(Clone, Debug)]
pub struct PathHandler {
    resolved: ResolvedPath,
    strategy: Strategy,
    keys: KeyScheme,
}

impl PathHandler {
    /// Validate `path` against the tree. Intermediate segments must already
    /// exist as objects.
    pub fn new(
        tree: &dyn ObservableTree,
        path: &DotPath,
        strategy: Strategy,
        keys: KeyScheme,
    ) -> PersistResult<Self> {
        let resolved =
            resolve(tree, path).map_err(|e| PersistError::config(path.as_str(), e.to_string()))?;
        Ok(Self {
            resolved,
            strategy,
            keys,
        })
    }

    pub fn path(&self) -> &DotPath {
        self.resolved.path()
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Storage key of the whole-value record.
    pub fn record_key(&self) -> String {
        self.keys.record_key(self.path())
    }

    /// Load, then subscribe. The subscription is only installed once the
    /// load has been applied.
    pub async fn activate(
        &self,
        tree: &dyn ObservableTree,
        storage: &dyn StorageEngine,
        all_keys: Option<&[String]>,
        queue: &Arc<WriteQueue>,
        bulk: &Arc<dyn BulkWriteHook>,
    ) -> PersistResult<Subscription> {
        self.load(tree, storage, all_keys).await?;
        Ok(self.subscribe(tree, Arc::clone(queue), Arc::clone(bulk)))
    }

    /// Merge persisted records into the tree.
    ///
    /// `all_keys` is the backend's key listing, required by `MultiFile`;
    /// it is fetched here when absent.
    pub async fn load(
        &self,
        tree: &dyn ObservableTree,
        storage: &dyn StorageEngine,
        all_keys: Option<&[String]>,
    ) -> PersistResult<()> {
        match self.strategy {
            Strategy::SingleFile => self.load_single(tree, storage).await,
            Strategy::MultiFile => match all_keys {
                Some(keys) => self.load_multi(tree, storage, keys).await,
                None => {
                    let keys = storage.get_all_keys().await?;
                    self.load_multi(tree, storage, &keys).await
                }
            },
        }
    }

    async fn load_single(
        &self,
        tree: &dyn ObservableTree,
        storage: &dyn StorageEngine,
    ) -> PersistResult<()> {
        let key = self.record_key();
        let Some(text) = storage.get_item(&key).await? else {
            debug!(key = %key, "no record; keeping initial value");
            return Ok(());
        };
        let incoming = parse_record(&key, &text)?;

        if self.path().is_root() {
            if !incoming.is_object() {
                return Err(PersistError::Serialization {
                    key,
                    reason: "whole-tree record is not an object".into(),
                });
            }
            let incoming = incoming.without_key(STATUS_FIELD);
            let current = tree.snapshot();
            tree.set(&[], merge_or_replace(Some(&current), incoming))?;
        } else {
            let segments = self.path().segments();
            let current = tree.get(segments);
            tree.set(segments, merge_or_replace(current.as_ref(), incoming))?;
        }
        debug!(key = %key, "record loaded");
        Ok(())
    }

    async fn load_multi(
        &self,
        tree: &dyn ObservableTree,
        storage: &dyn StorageEngine,
        all_keys: &[String],
    ) -> PersistResult<()> {
        let path = self.path();
        let mut batch = Vec::new();
        let target = match self.resolved.value(tree) {
            Some(value) if value.is_object() => value,
            Some(_) => {
                return Err(PersistError::config(
                    path.as_str(),
                    "multiFile requires an object value",
                ))
            }
            None => {
                let empty = Snapshot::empty_object();
                batch.push(Mutation::Set {
                    path: path.segments().to_vec(),
                    value: empty.clone(),
                });
                empty
            }
        };

        let children: Vec<(&str, &str)> = all_keys
            .iter()
            .filter_map(|key| {
                self.keys
                    .child_of(key, path)
                    .map(|child| (key.as_str(), child))
            })
            .collect();

        let records = try_join_all(children.into_iter().map(|(key, child)| async move {
            match storage.get_item(key).await? {
                Some(text) => Ok::<_, PersistError>((child, parse_record(key, &text)?)),
                None => Err(PersistError::Consistency {
                    key: key.to_string(),
                }),
            }
        }))
        .await?;

        let loaded = records.len();
        for (child, incoming) in records {
            batch.push(Mutation::Set {
                path: path.child_segments(child),
                value: merge_or_replace(target.get(child), incoming),
            });
        }
        if !batch.is_empty() {
            tree.apply(batch)?;
        }
        debug!(path = %path, records = loaded, "per-key records loaded");
        Ok(())
    }

    /// Watch the path and queue writes for every change.
    pub fn subscribe(
        &self,
        tree: &dyn ObservableTree,
        queue: Arc<WriteQueue>,
        bulk: Arc<dyn BulkWriteHook>,
    ) -> Subscription {
        let sink = Sink { queue, bulk };
        match self.strategy {
            Strategy::SingleFile => {
                let key = self.record_key();
                if self.path().is_root() {
                    tree.subscribe_all(Box::new(move |change: &TreeChange| {
                        if change.only_touches_field(STATUS_FIELD) {
                            return;
                        }
                        sink.queue
                            .enqueue(key.clone(), Some(change.root.without_key(STATUS_FIELD)));
                        sink.trigger();
                    }))
                } else {
                    let leaf = self.resolved.leaf().unwrap_or_default();
                    tree.subscribe_key(
                        self.resolved.parent(),
                        leaf,
                        Box::new(move |value: Option<&Snapshot>| {
                            sink.queue.enqueue(key.clone(), value.cloned());
                            sink.trigger();
                        }),
                    )
                }
            }
            Strategy::MultiFile => {
                let differ = Arc::new(KeyDiffer {
                    path: self.path().clone(),
                    keys: self.keys.clone(),
                    previous: Mutex::new(Snapshot::null()),
                    sink,
                });
                if self.path().is_root() {
                    differ.rotate(tree.snapshot().without_key(STATUS_FIELD));
                    tree.subscribe_all(Box::new(move |change: &TreeChange| {
                        if change.only_touches_field(STATUS_FIELD) {
                            return;
                        }
                        differ.changed(change.root.without_key(STATUS_FIELD));
                    }))
                } else {
                    differ.rotate(self.resolved.value(tree).unwrap_or_else(Snapshot::null));
                    let leaf = self.resolved.leaf().unwrap_or_default();
                    tree.subscribe_key(
                        self.resolved.parent(),
                        leaf,
                        Box::new(move |value: Option<&Snapshot>| {
                            differ.changed(value.cloned().unwrap_or_else(Snapshot::null));
                        }),
                    )
                }
            }
        }
    }
}

/// Where subscription callbacks send their writes.
struct Sink {
    queue: Arc<WriteQueue>,
    bulk: Arc<dyn BulkWriteHook>,
}

impl Sink {
    fn trigger(&self) {
        self.bulk
            .before_bulk_write(BulkFlush::new(Arc::clone(&self.queue)));
    }
}

/// Diffs each new value of a `MultiFile` path against the last one seen.
struct KeyDiffer {
    path: DotPath,
    keys: KeyScheme,
    previous: Mutex<Snapshot>,
    sink: Sink,
}

impl KeyDiffer {
    fn rotate(&self, current: Snapshot) -> Snapshot {
        std::mem::replace(
            &mut *self.previous.lock().unwrap_or_else(PoisonError::into_inner),
            current,
        )
    }

    fn changed(&self, current: Snapshot) {
        let previous = self.rotate(current.clone());
        let diff = diff_snapshots(&previous, &current);
        if diff.is_empty() {
            return;
        }
        for change in diff.changes() {
            let value = if change.has_value() {
                current.get(change.key()).cloned()
            } else {
                None
            };
            self.sink
                .queue
                .enqueue(self.keys.child_key(&self.path, change.key()), value);
        }
        self.sink.trigger();
    }
}

fn parse_record(key: &str, text: &str) -> PersistResult<Snapshot> {
    Snapshot::from_json(text).map_err(|e| PersistError::Serialization {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Shallow-merge `incoming` into `current` when both are objects, otherwise
/// take `incoming` as is.
fn merge_or_replace(current: Option<&Snapshot>, incoming: Snapshot) -> Snapshot {
    current
        .and_then(|current| current.shallow_merge(&incoming))
        .unwrap_or(incoming)
}
