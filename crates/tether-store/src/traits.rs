use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Four-method key/value capability every backend adapts to.
///
/// Implementations must satisfy these invariants:
/// - `get_item` returns `Ok(None)` for an absent key.
/// - Any key returned by `get_all_keys` is readable by `get_item` until it is
///   removed.
/// - `remove_item` on an absent key succeeds.
/// - Durability, atomicity, and latency are the backend's own business.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Read the value stored at `key`.
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>>;

    /// Create or overwrite the value at `key`.
    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete the value at `key`.
    async fn remove_item(&self, key: &str) -> StorageResult<()>;

    /// List every key currently stored.
    async fn get_all_keys(&self) -> StorageResult<Vec<String>>;
}

#[async_trait]
impl<S: StorageEngine + ?Sized> StorageEngine for Arc<S> {
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        (**self).remove_item(key).await
    }

    async fn get_all_keys(&self) -> StorageResult<Vec<String>> {
        (**self).get_all_keys().await
    }
}

/// Supplies the storage engine. Invoked exactly once per bootstrap.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn get_storage(&self) -> StorageResult<Arc<dyn StorageEngine>>;
}

/// An already-constructed engine supplies itself.
#[async_trait]
impl StorageProvider for Arc<dyn StorageEngine> {
    async fn get_storage(&self) -> StorageResult<Arc<dyn StorageEngine>> {
        Ok(Arc::clone(self))
    }
}

/// A provider backed by an async closure. See [`provider_fn`].
pub struct ProviderFn<F>(F);

/// Wrap an async closure as a [`StorageProvider`].
///
/// Useful when acquiring the backend is itself asynchronous (opening a
/// database, connecting to a remote store).
pub fn provider_fn<F, Fut>(f: F) -> ProviderFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = StorageResult<Arc<dyn StorageEngine>>> + Send,
{
    ProviderFn(f)
}

#[async_trait]
impl<F, Fut> StorageProvider for ProviderFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = StorageResult<Arc<dyn StorageEngine>>> + Send,
{
    async fn get_storage(&self) -> StorageResult<Arc<dyn StorageEngine>> {
        (self.0)().await
    }
}
