//! In-memory observable tree.
//!
//! [`MemoryTree`] keeps its root as a [`Snapshot`] behind a `RwLock`.
//! Mutations copy-on-write along the mutated path only, so taking a snapshot
//! is a pointer clone and untouched subtrees keep their identity from one
//! snapshot to the next.
//!
//! Committed batches go through an outbox so notifications reach
//! subscribers in commit order even when several threads mutate the tree.
//! Whichever thread finds the outbox idle drains it; a batch committed while
//! another thread is delivering is delivered by that thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tether_types::{ChangeKind, ChangeOp, Mutation, Snapshot};
use tracing::trace;

use crate::error::TreeResult;
use crate::subscription::Subscription;
use crate::traits::{AllChangesCallback, FieldChangeCallback, ObservableTree, TreeChange};

enum Listener {
    All(Arc<dyn Fn(&TreeChange) + Send + Sync>),
    Field {
        path: Vec<String>,
        callback: Arc<dyn Fn(Option<&Snapshot>) + Send + Sync>,
    },
}

#[derive(Default)]
struct Outbox {
    pending: VecDeque<TreeChange>,
    delivering: bool,
}

/// Releases the outbox if a callback panics mid-delivery.
struct Delivery<'a> {
    outbox: &'a Mutex<Outbox>,
    finished: bool,
}

impl Drop for Delivery<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.outbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .delivering = false;
        }
    }
}

struct Inner {
    root: RwLock<Snapshot>,
    listeners: RwLock<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
    outbox: Mutex<Outbox>,
}

impl Inner {
    fn register(self: &Arc<Self>, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));

        let weak: Weak<Inner> = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .listeners
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(lid, _)| *lid != id);
            }
        })
    }
}

/// Copy-on-write observable tree.
///
/// Cloning a `MemoryTree` yields another handle to the same tree.
#[derive(Clone)]
pub struct MemoryTree {
    inner: Arc<Inner>,
}

impl MemoryTree {
    /// Create a tree whose root is `initial`.
    pub fn new(initial: impl Into<Snapshot>) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: RwLock::new(initial.into()),
                listeners: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
                outbox: Mutex::new(Outbox::default()),
            }),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver queued batches in commit order, unless another call is
    /// already doing so.
    fn deliver(&self) {
        {
            let mut outbox = self
                .inner
                .outbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if outbox.delivering {
                return;
            }
            outbox.delivering = true;
        }

        let mut delivery = Delivery {
            outbox: &self.inner.outbox,
            finished: false,
        };
        loop {
            let change = {
                let mut outbox = self
                    .inner
                    .outbox
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                match outbox.pending.pop_front() {
                    Some(change) => change,
                    None => {
                        // Cleared under the same lock that enqueues.
                        outbox.delivering = false;
                        delivery.finished = true;
                        return;
                    }
                }
            };
            self.notify(&change);
        }
    }

    fn notify(&self, change: &TreeChange) {
        // Clone the callbacks out so none runs under the lock.
        let mut all = Vec::new();
        let mut fields = Vec::new();
        {
            let listeners = self
                .inner
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            for (_, listener) in listeners.iter() {
                match listener {
                    Listener::All(cb) => all.push(Arc::clone(cb)),
                    Listener::Field { path, callback } => {
                        if change.ops.iter().any(|op| op.touches(path)) {
                            fields.push((path.clone(), Arc::clone(callback)));
                        }
                    }
                }
            }
        }

        trace!(
            ops = change.ops.len(),
            all = all.len(),
            fields = fields.len(),
            "notifying tree subscribers"
        );
        for cb in all {
            cb(change);
        }
        for (path, cb) in fields {
            cb(change.root.get_path(&path));
        }
    }
}

impl ObservableTree for MemoryTree {
    fn snapshot(&self) -> Snapshot {
        self.inner
            .root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn apply(&self, mutations: Vec<Mutation>) -> TreeResult<Vec<ChangeOp>> {
        let mut ops = Vec::with_capacity(mutations.len());
        {
            let mut root = self
                .inner
                .root
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let mut next = root.clone();
            for mutation in mutations {
                match mutation {
                    Mutation::Set { path, value } => {
                        if next.get_path(&path).is_some_and(|cur| Snapshot::ptr_eq(cur, &value)) {
                            continue;
                        }
                        let kind = match next.set_in(&path, value)? {
                            Some(_) => ChangeKind::Replace,
                            None => ChangeKind::Add,
                        };
                        ops.push(ChangeOp::new(kind, path));
                    }
                    Mutation::Remove { path } => {
                        if next.remove_in(&path)?.is_some() {
                            ops.push(ChangeOp::new(ChangeKind::Remove, path));
                        }
                    }
                }
            }
            if ops.is_empty() {
                return Ok(ops);
            }
            *root = next.clone();
            // Queued before the root lock drops, so outbox order is commit order.
            self.inner
                .outbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pending
                .push_back(TreeChange {
                    ops: ops.clone(),
                    root: next,
                });
        }

        self.deliver();
        Ok(ops)
    }

    fn subscribe_all(&self, callback: AllChangesCallback) -> Subscription {
        self.inner.register(Listener::All(Arc::from(callback)))
    }

    fn subscribe_key(
        &self,
        parent: &[String],
        key: &str,
        callback: FieldChangeCallback,
    ) -> Subscription {
        let mut path = parent.to_vec();
        path.push(key.to_string());
        self.inner.register(Listener::Field {
            path,
            callback: Arc::from(callback),
        })
    }
}

impl std::fmt::Debug for MemoryTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTree")
            .field("root", &self.snapshot())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn seg(path: &[&str]) -> Vec<String> {
        path.iter().map(|s| s.to_string()).collect()
    }

    fn tree() -> MemoryTree {
        MemoryTree::new(json!({"user": {"name": "ada", "age": 36}, "photos": {}}))
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    #[test]
    fn set_and_get() {
        let t = tree();
        t.set(&seg(&["user", "name"]), Snapshot::from(json!("grace")))
            .unwrap();
        assert_eq!(t.get(&seg(&["user", "name"])).unwrap().to_value(), json!("grace"));
    }

    #[test]
    fn snapshots_are_immutable() {
        let t = tree();
        let before = t.snapshot();
        t.set(&seg(&["user", "age"]), Snapshot::from(json!(37))).unwrap();
        assert_eq!(before.get_path(&seg(&["user", "age"])).unwrap().to_value(), json!(36));
    }

    #[test]
    fn untouched_subtrees_keep_identity() {
        let t = tree();
        let before = t.snapshot();
        t.set(&seg(&["user", "age"]), Snapshot::from(json!(37))).unwrap();
        let after = t.snapshot();
        assert!(Snapshot::ptr_eq(before.get("photos").unwrap(), after.get("photos").unwrap()));
        assert!(!Snapshot::ptr_eq(before.get("user").unwrap(), after.get("user").unwrap()));
    }

    #[test]
    fn apply_reports_kinds() {
        let t = tree();
        let ops = t
            .apply(vec![
                Mutation::set(&["photos", "1"], json!({"url": "a"})),
                Mutation::set(&["user", "name"], json!("grace")),
                Mutation::remove(&["user", "age"]),
                Mutation::remove(&["user", "missing"]),
            ])
            .unwrap();
        let kinds: Vec<ChangeKind> = ops.iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Add, ChangeKind::Replace, ChangeKind::Remove]);
    }

    #[test]
    fn failed_batch_applies_nothing() {
        let t = tree();
        let result = t.apply(vec![
            Mutation::set(&["user", "name"], json!("grace")),
            Mutation::set(&["nope", "leaf"], json!(1)),
        ]);
        assert!(result.is_err());
        assert_eq!(t.get(&seg(&["user", "name"])).unwrap().to_value(), json!("ada"));
    }

    #[test]
    fn setting_same_handle_is_a_noop() {
        let t = tree();
        let user = t.get(&seg(&["user"])).unwrap();
        let ops = t.apply(vec![Mutation::Set { path: seg(&["user"]), value: user }]).unwrap();
        assert!(ops.is_empty());
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    #[test]
    fn all_subscribers_get_each_batch() {
        let t = tree();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = t.subscribe_all(Box::new(move |change| {
            sink.lock().unwrap().push(change.ops.len());
        }));

        t.apply(vec![
            Mutation::set(&["user", "name"], json!("x")),
            Mutation::set(&["user", "age"], json!(1)),
        ])
        .unwrap();
        t.remove(&seg(&["photos"])).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![2, 1]);
    }

    #[test]
    fn field_subscriber_sees_descendants_and_ancestors() {
        let t = tree();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = t.subscribe_key(
            &[],
            "user",
            Box::new(move |value| {
                sink.lock().unwrap().push(value.map(Snapshot::to_value));
            }),
        );

        t.set(&seg(&["user", "age"]), Snapshot::from(json!(40))).unwrap();
        t.set(&seg(&["photos", "1"]), Snapshot::from(json!(1))).unwrap();
        t.set(&[], Snapshot::from(json!({"photos": {}}))).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].as_ref().unwrap()["age"], json!(40));
        assert!(seen[1].is_none());
    }

    #[test]
    fn dropping_subscription_stops_notifications() {
        let t = tree();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let sub = t.subscribe_all(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(t.subscriber_count(), 1);

        t.set(&seg(&["user", "age"]), Snapshot::from(json!(1))).unwrap();
        drop(sub);
        t.set(&seg(&["user", "age"]), Snapshot::from(json!(2))).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(t.subscriber_count(), 0);
    }

    #[test]
    fn batches_from_racing_threads_arrive_in_commit_order() {
        use std::sync::atomic::AtomicBool;
        use std::sync::mpsc;

        let t = MemoryTree::new(json!({"n": 0}));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);
        let stalled = AtomicBool::new(false);

        let sink = Arc::clone(&seen);
        let _sub = t.subscribe_all(Box::new(move |change| {
            sink.lock().unwrap().push(change.root.get("n").unwrap().to_value());
            if !stalled.swap(true, Ordering::SeqCst) {
                entered_tx.lock().unwrap().send(()).unwrap();
                release_rx.lock().unwrap().recv().unwrap();
            }
        }));

        let writer = t.clone();
        let first = std::thread::spawn(move || {
            writer.set(&seg(&["n"]), Snapshot::from(json!(1))).unwrap();
        });
        entered_rx.recv().unwrap();

        // Committed while the first batch is still being delivered.
        t.set(&seg(&["n"]), Snapshot::from(json!(2))).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![json!(1)]);

        release_tx.send(()).unwrap();
        first.join().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn callbacks_may_mutate_the_tree() {
        let t = tree();
        let writer = t.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = t.subscribe_all(Box::new(move |change| {
            let age = change.root.get_path(&seg(&["user", "age"])).unwrap().to_value();
            sink.lock().unwrap().push(age.clone());
            if age == json!(1) {
                writer.set(&seg(&["user", "age"]), Snapshot::from(json!(2))).unwrap();
            }
        }));

        t.set(&seg(&["user", "age"]), Snapshot::from(json!(1))).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2)]);
        assert_eq!(t.get(&seg(&["user", "age"])).unwrap().to_value(), json!(2));
    }

    #[test]
    fn callbacks_may_read_the_tree() {
        let t = tree();
        let reader = t.clone();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let _sub = t.subscribe_all(Box::new(move |_| {
            *sink.lock().unwrap() = Some(reader.snapshot());
        }));
        t.set(&seg(&["user", "age"]), Snapshot::from(json!(99))).unwrap();
        let snap = seen.lock().unwrap().clone().unwrap();
        assert_eq!(snap.get_path(&seg(&["user", "age"])).unwrap().to_value(), json!(99));
    }
}
