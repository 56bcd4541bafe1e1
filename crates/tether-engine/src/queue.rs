//! Pending write queue.
//!
//! Writes are keyed by storage key. A key changing again before the next
//! flush overwrites its pending entry, so only the latest value is written.
//! Flushing takes each entry off the queue as it is dispatched: a key that
//! changes while its previous write is still in flight gets a fresh entry
//! for the next flush.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::join_all;
use tether_store::StorageEngine;
use tether_types::Snapshot;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::PersistError;
use crate::hooks::{PendingWrite, WriteAction, WriteHook};

/// Outcome of one flush.
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Keys whose value was stored.
    pub written: Vec<String>,
    /// Keys whose record was deleted.
    pub removed: Vec<String>,
    /// Keys whose write failed. These are not re-queued.
    pub failed: Vec<(String, PersistError)>,
}

impl FlushReport {
    /// Returns `true` if nothing failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of writes attempted.
    pub fn len(&self) -> usize {
        self.written.len() + self.removed.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Last-writer-wins queue of pending writes. `None` marks a delete.
///
/// A queue built inside a tokio runtime remembers it, so background flushes
/// still have somewhere to run when a change arrives from a thread outside
/// any runtime.
pub struct WriteQueue {
    pending: Mutex<BTreeMap<String, Option<Snapshot>>>,
    storage: Arc<dyn StorageEngine>,
    hook: Arc<dyn WriteHook>,
    runtime: Option<Handle>,
}

impl WriteQueue {
    pub fn new(storage: Arc<dyn StorageEngine>, hook: Arc<dyn WriteHook>) -> Self {
        Self {
            pending: Mutex::new(BTreeMap::new()),
            storage,
            hook,
            runtime: Handle::try_current().ok(),
        }
    }

    /// Runtime the queue was built in, if any.
    pub fn runtime(&self) -> Option<&Handle> {
        self.runtime.as_ref()
    }

    /// Queue `value` for `key`, replacing any pending entry.
    pub fn enqueue(&self, key: String, value: Option<Snapshot>) {
        debug!(key = %key, delete = value.is_none(), "write queued");
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    /// Keys with a pending write, sorted.
    pub fn pending_keys(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch every pending write through the write hook, concurrently.
    ///
    /// Entries leave the queue before their write starts. Calling `flush`
    /// again with no new writes does nothing.
    pub async fn flush(&self) -> FlushReport {
        let drained = std::mem::take(
            &mut *self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let mut report = FlushReport::default();
        if drained.is_empty() {
            return report;
        }
        debug!(count = drained.len(), "flushing writes");

        let mut writes = Vec::with_capacity(drained.len());
        for (key, value) in drained {
            let action = match value {
                Some(snapshot) => match snapshot.to_json() {
                    Ok(json) => WriteAction::Set(json),
                    Err(e) => {
                        report.failed.push((
                            key.clone(),
                            PersistError::Serialization {
                                key,
                                reason: e.to_string(),
                            },
                        ));
                        continue;
                    }
                },
                None => WriteAction::Remove,
            };
            writes.push(PendingWrite::new(Arc::clone(&self.storage), key, action));
        }

        let results = join_all(writes.into_iter().map(|write| async move {
            let key = write.key().to_string();
            let delete = write.is_delete();
            let result = self.hook.before_write(write, &key).await;
            (key, delete, result)
        }))
        .await;

        for (key, delete, result) in results {
            match result {
                Ok(()) if delete => report.removed.push(key),
                Ok(()) => report.written.push(key),
                Err(e) => {
                    warn!(key = %key, error = %e, "write failed; entry is not re-queued");
                    report.failed.push((key, PersistError::Storage(e)));
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteQueue")
            .field("pending", &self.pending_keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::ImmediateWrite;
    use async_trait::async_trait;
    use serde_json::json;
    use tether_store::{InMemoryStorage, StorageOp, StorageResult};
    use tokio::sync::Notify;

    fn setup() -> (Arc<InMemoryStorage>, WriteQueue) {
        let store = Arc::new(InMemoryStorage::new());
        let queue = WriteQueue::new(store.clone(), Arc::new(ImmediateWrite));
        (store, queue)
    }

    fn snap(value: serde_json::Value) -> Option<Snapshot> {
        Some(Snapshot::from(value))
    }

    #[tokio::test]
    async fn flush_writes_json_and_deletes() {
        let (store, queue) = setup();
        queue.enqueue("app-photos.1".into(), None);
        queue.enqueue("app-settings".into(), snap(json!({"theme": "dark"})));

        let report = queue.flush().await;

        assert!(report.is_clean());
        assert_eq!(report.written, vec!["app-settings"]);
        assert_eq!(report.removed, vec!["app-photos.1"]);
        assert_eq!(
            store.peek("app-settings").as_deref(),
            Some("{\"theme\":\"dark\"}")
        );
        assert!(store.writes().contains(&StorageOp::Remove("app-photos.1".into())));
    }

    #[tokio::test]
    async fn last_writer_wins_between_flushes() {
        let (store, queue) = setup();
        queue.enqueue("k".into(), snap(json!(1)));
        queue.enqueue("k".into(), snap(json!(2)));
        queue.enqueue("k".into(), None);
        queue.enqueue("k".into(), snap(json!(3)));
        assert_eq!(queue.len(), 1);

        queue.flush().await;
        assert_eq!(store.writes(), vec![StorageOp::Set("k".into(), "3".into())]);
    }

    #[tokio::test]
    async fn second_flush_is_a_noop() {
        let (store, queue) = setup();
        queue.enqueue("k".into(), snap(json!(1)));

        let first = queue.flush().await;
        let second = queue.flush().await;

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn failed_write_is_reported_and_dropped() {
        let (store, queue) = setup();
        store.fail_key("bad");
        queue.enqueue("bad".into(), snap(json!(1)));
        queue.enqueue("good".into(), snap(json!(2)));

        let report = queue.flush().await;

        assert_eq!(report.written, vec!["good"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad");
        assert!(matches!(report.failed[0].1, PersistError::Storage(_)));
        assert!(queue.is_empty());
    }

    /// Holds every write until released.
    struct GatedHook {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl WriteHook for GatedHook {
        async fn before_write(&self, write: PendingWrite, _key: &str) -> StorageResult<()> {
            self.gate.notified().await;
            write.dispatch().await
        }
    }

    #[tokio::test]
    async fn enqueue_during_flight_creates_fresh_entry() {
        let store = Arc::new(InMemoryStorage::new());
        let gate = Arc::new(Notify::new());
        let queue = Arc::new(WriteQueue::new(
            store.clone(),
            Arc::new(GatedHook { gate: gate.clone() }),
        ));
        queue.enqueue("k".into(), snap(json!(1)));

        let in_flight = tokio::spawn({
            let queue = queue.clone();
            async move { queue.flush().await }
        });
        tokio::task::yield_now().await;
        assert!(queue.is_empty());

        queue.enqueue("k".into(), snap(json!(2)));
        assert_eq!(queue.pending_keys(), vec!["k"]);

        gate.notify_one();
        let report = in_flight.await.unwrap();
        assert_eq!(report.written, vec!["k"]);
        assert_eq!(store.peek("k").as_deref(), Some("1"));

        gate.notify_one();
        queue.flush().await;
        assert_eq!(store.peek("k").as_deref(), Some("2"));
    }
}
