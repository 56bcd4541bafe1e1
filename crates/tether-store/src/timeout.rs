//! Deadline-bounded storage.
//!
//! A stalled backend call otherwise stalls the load of its path, and with it
//! the whole bootstrap. [`TimeoutStorage`] turns a stall into
//! [`StorageError::Timeout`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{StorageError, StorageResult};
use crate::traits::StorageEngine;

/// Wraps a backend and bounds each call by `limit`.
#[derive(Debug)]
pub struct TimeoutStorage<S> {
    inner: S,
    limit: Duration,
}

impl<S: StorageEngine> TimeoutStorage<S> {
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        key: Option<&str>,
        call: impl Future<Output = StorageResult<T>> + Send,
    ) -> StorageResult<T> {
        match tokio::time::timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, key, limit_ms = self.limit.as_millis() as u64, "storage call timed out");
                Err(StorageError::Timeout {
                    op,
                    key: key.map(str::to_string),
                    after: self.limit,
                })
            }
        }
    }
}

#[async_trait]
impl<S: StorageEngine> StorageEngine for TimeoutStorage<S> {
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        self.bounded("get_item", Some(key), self.inner.get_item(key))
            .await
    }

    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        self.bounded("set_item", Some(key), self.inner.set_item(key, value))
            .await
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.bounded("remove_item", Some(key), self.inner.remove_item(key))
            .await
    }

    async fn get_all_keys(&self) -> StorageResult<Vec<String>> {
        self.bounded("get_all_keys", None, self.inner.get_all_keys())
            .await
    }
}
