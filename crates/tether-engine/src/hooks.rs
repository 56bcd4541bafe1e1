//! Write hooks.
//!
//! Two seams let the host shape how writes reach storage:
//!
//! - [`WriteHook`] sees every single write before it is dispatched and
//!   decides when (and how often) to run it.
//! - [`BulkWriteHook`] is told whenever new writes are pending and decides
//!   when to flush the whole queue, enabling throttling and batching.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tether_store::{StorageEngine, StorageResult};
use tracing::{debug, warn};

use crate::queue::{FlushReport, WriteQueue};

/// What a pending write does to its key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteAction {
    /// Store this JSON text.
    Set(String),
    /// Delete the record.
    Remove,
}

/// A write taken off the queue, ready to dispatch.
///
/// Cloning is cheap, and dispatching a clone performs the same write again,
/// which is what retrying hooks rely on.
#[derive(Clone)]
pub struct PendingWrite {
    storage: Arc<dyn StorageEngine>,
    key: String,
    action: WriteAction,
}

impl PendingWrite {
    pub(crate) fn new(storage: Arc<dyn StorageEngine>, key: String, action: WriteAction) -> Self {
        Self {
            storage,
            key,
            action,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn action(&self) -> &WriteAction {
        &self.action
    }

    pub fn is_delete(&self) -> bool {
        self.action == WriteAction::Remove
    }

    /// Perform the write against storage.
    pub async fn dispatch(&self) -> StorageResult<()> {
        match &self.action {
            WriteAction::Set(json) => self.storage.set_item(&self.key, json).await,
            WriteAction::Remove => self.storage.remove_item(&self.key).await,
        }
    }
}

impl std::fmt::Debug for PendingWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingWrite")
            .field("key", &self.key)
            .field("action", &self.action)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Per-write hooks
// ---------------------------------------------------------------------------

/// Runs before every dispatched write.
#[async_trait]
pub trait WriteHook: Send + Sync {
    /// Dispatch `write` (stored under `key`), now, later, or repeatedly.
    async fn before_write(&self, write: PendingWrite, key: &str) -> StorageResult<()>;
}

/// Dispatches every write immediately. The default.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateWrite;

#[async_trait]
impl WriteHook for ImmediateWrite {
    async fn before_write(&self, write: PendingWrite, _key: &str) -> StorageResult<()> {
        write.dispatch().await
    }
}

/// How the delay grows between retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Linear,
    Exponential,
}

/// Retry budget and pacing for [`RetryWrite`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff, base_delay: Duration) -> Self {
        Self {
            max_retries,
            backoff,
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (0 is the first retry).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Linear => self.base_delay.saturating_mul(attempt.saturating_add(1)),
            Backoff::Exponential => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
        }
    }
}

impl Default for RetryPolicy {
    /// Default: 3 retries, exponential backoff, 100ms base delay.
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::Exponential,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Re-dispatches failed writes according to a [`RetryPolicy`].
///
/// A write leaves the queue when it is dispatched, so without a retrying
/// hook a failed write is lost until the value changes again.
#[derive(Clone, Debug, Default)]
pub struct RetryWrite {
    policy: RetryPolicy,
}

impl RetryWrite {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl WriteHook for RetryWrite {
    async fn before_write(&self, write: PendingWrite, key: &str) -> StorageResult<()> {
        let mut attempt = 0;
        loop {
            match write.dispatch().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.policy.max_retries => {
                    let delay = self.policy.delay(attempt);
                    warn!(key, attempt, delay_ms = delay.as_millis() as u64, error = %e, "write failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Bulk hooks
// ---------------------------------------------------------------------------

/// Handle that flushes the write queue when run.
#[derive(Clone)]
pub struct BulkFlush {
    queue: Arc<WriteQueue>,
}

impl BulkFlush {
    pub(crate) fn new(queue: Arc<WriteQueue>) -> Self {
        Self { queue }
    }

    /// Runtime to flush on: the queue's own, else the caller's.
    pub fn runtime(&self) -> Option<tokio::runtime::Handle> {
        self.queue
            .runtime()
            .cloned()
            .or_else(|| tokio::runtime::Handle::try_current().ok())
    }

    /// Number of writes pending right now.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Dispatch every pending write.
    pub async fn run(self) -> FlushReport {
        self.queue.flush().await
    }
}

impl std::fmt::Debug for BulkFlush {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkFlush")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Called whenever new writes are queued.
///
/// Called synchronously from tree change notifications, so implementations
/// must not block; they hand the flush to a runtime or hold on to it.
pub trait BulkWriteHook: Send + Sync {
    fn before_bulk_write(&self, flush: BulkFlush);
}

fn spawn_flush(flush: BulkFlush, delay: Option<Duration>, after: impl FnOnce() + Send + 'static) {
    match flush.runtime() {
        Some(handle) => {
            handle.spawn(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                after();
                let report = flush.run().await;
                if !report.is_clean() {
                    warn!(failed = report.failed.len(), "flush completed with failures");
                }
            });
        }
        None => {
            after();
            debug!(
                pending = flush.pending(),
                "no async runtime; writes stay queued until flushed"
            );
        }
    }
}

/// Spawns each flush right away on the runtime the engine started in. The
/// default.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpawnBulkWrite;

impl BulkWriteHook for SpawnBulkWrite {
    fn before_bulk_write(&self, flush: BulkFlush) {
        spawn_flush(flush, None, || {});
    }
}

/// Never flushes on its own; the host calls `PersistEngine::flush`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeferredBulkWrite;

impl BulkWriteHook for DeferredBulkWrite {
    fn before_bulk_write(&self, _flush: BulkFlush) {}
}

/// Coalesces every trigger inside a `delay` window into one flush.
#[derive(Debug)]
pub struct DebouncedBulkWrite {
    delay: Duration,
    scheduled: Arc<AtomicBool>,
}

impl DebouncedBulkWrite {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            scheduled: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl BulkWriteHook for DebouncedBulkWrite {
    fn before_bulk_write(&self, flush: BulkFlush) {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let scheduled = Arc::clone(&self.scheduled);
        spawn_flush(flush, Some(self.delay), move || {
            scheduled.store(false, Ordering::Release);
        });
    }
}
