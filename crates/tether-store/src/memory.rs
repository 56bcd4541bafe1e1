use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::traits::StorageEngine;

/// One call observed by [`InMemoryStorage`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageOp {
    Get(String),
    Set(String, String),
    Remove(String),
    ListKeys,
}

impl StorageOp {
    /// Returns `true` for calls that change stored data.
    pub fn is_write(&self) -> bool {
        matches!(self, StorageOp::Set(..) | StorageOp::Remove(_))
    }
}

/// In-memory, `BTreeMap`-based storage engine.
///
/// Intended for tests and embedding. Every call is appended to a journal so
/// callers can assert exactly which reads and writes happened. Keys can be
/// marked as failing to exercise error paths.
#[derive(Default)]
pub struct InMemoryStorage {
    records: RwLock<BTreeMap<String, String>>,
    journal: Mutex<Vec<StorageOp>>,
    failing: RwLock<BTreeSet<String>>,
}

impl InMemoryStorage {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `records`. Seeding is not journaled.
    pub fn with_records<I, K, V>(records: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        {
            let mut map = store.records.write().unwrap_or_else(PoisonError::into_inner);
            for (k, v) in records {
                map.insert(k.into(), v.into());
            }
        }
        store
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a record without journaling the access.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Sorted list of stored keys, without journaling the access.
    pub fn keys(&self) -> Vec<String> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Every call made so far, in order.
    pub fn history(&self) -> Vec<StorageOp> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Only the calls that changed stored data.
    pub fn writes(&self) -> Vec<StorageOp> {
        self.history().into_iter().filter(StorageOp::is_write).collect()
    }

    /// Forget the journal.
    pub fn clear_history(&self) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Make every subsequent call touching `key` fail.
    pub fn fail_key(&self, key: &str) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string());
    }

    /// Undo all [`fail_key`](Self::fail_key) calls.
    pub fn heal(&self) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, op: StorageOp) {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op);
    }

    fn check(&self, key: &str) -> StorageResult<()> {
        let failing = self.failing.read().map_err(|e| {
            StorageError::Backend(format!("lock poisoned: {e}"))
        })?;
        if failing.contains(key) {
            return Err(StorageError::Backend(format!("injected failure for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for InMemoryStorage {
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        self.record(StorageOp::Get(key.to_string()));
        self.check(key)?;
        let records = self.records.read().map_err(|e| {
            StorageError::Backend(format!("lock poisoned: {e}"))
        })?;
        Ok(records.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        self.record(StorageOp::Set(key.to_string(), value.to_string()));
        self.check(key)?;
        let mut records = self.records.write().map_err(|e| {
            StorageError::Backend(format!("lock poisoned: {e}"))
        })?;
        records.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.record(StorageOp::Remove(key.to_string()));
        self.check(key)?;
        let mut records = self.records.write().map_err(|e| {
            StorageError::Backend(format!("lock poisoned: {e}"))
        })?;
        records.remove(key);
        Ok(())
    }

    async fn get_all_keys(&self) -> StorageResult<Vec<String>> {
        self.record(StorageOp::ListKeys);
        let records = self.records.read().map_err(|e| {
            StorageError::Backend(format!("lock poisoned: {e}"))
        })?;
        Ok(records.keys().cloned().collect())
    }
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("record_count", &self.len())
            .finish()
    }
}
