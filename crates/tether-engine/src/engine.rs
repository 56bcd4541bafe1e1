//! Bootstrap and lifecycle.
//!
//! [`PersistEngine::start`] acquires storage, loads and activates every
//! configured path concurrently, runs migrations, then marks the tree
//! loaded. Any failure on the way marks it `error` instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use futures_util::future::try_join_all;
use tether_store::{StorageEngine, StorageProvider};
use tether_tree::{ObservableTree, Subscription};
use tether_types::{DotPath, KeyScheme, Strategy, STATUS_FIELD};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::PersistConfig;
use crate::error::{PersistError, PersistResult};
use crate::handler::PathHandler;
use crate::hooks::{BulkWriteHook, WriteHook};
use crate::migrate::{MigrationRunner, Migrations};
use crate::queue::{FlushReport, WriteQueue};
use crate::status::{PersistState, PersistStatus};

/// Keeps an [`ObservableTree`] in sync with a storage backend.
pub struct PersistEngine {
    name: String,
    version: u32,
    keys: KeyScheme,
    tree: Arc<dyn ObservableTree>,
    handlers: Vec<PathHandler>,
    migrations: Migrations,
    provider: Arc<dyn StorageProvider>,
    write_hook: Arc<dyn WriteHook>,
    bulk_write_hook: Arc<dyn BulkWriteHook>,
    status: watch::Sender<PersistStatus>,
    started: AtomicBool,
    queue: OnceLock<Arc<WriteQueue>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl PersistEngine {
    /// Seed `tree` with the initial state and a `loading` status, and
    /// validate every configured path against it.
    pub fn new(config: PersistConfig, tree: Arc<dyn ObservableTree>) -> PersistResult<Self> {
        let PersistConfig {
            options,
            initial_state,
            migrations,
            storage,
            write_hook,
            bulk_write_hook,
        } = config;
        options.validate()?;

        let status = PersistStatus::loading(options.version);
        let mut seed = initial_state;
        seed.set_in(&[STATUS_FIELD.to_string()], status.to_snapshot())?;
        tree.set(&[], seed)?;

        let keys = KeyScheme::new(&options.name);
        let handlers = options
            .strategies
            .entries()?
            .into_iter()
            .map(|(path, strategy)| PathHandler::new(tree.as_ref(), &path, strategy, keys.clone()))
            .collect::<PersistResult<Vec<_>>>()?;

        let (status, _) = watch::channel(status);
        Ok(Self {
            name: options.name,
            version: options.version,
            keys,
            tree,
            handlers,
            migrations,
            provider: storage,
            write_hook,
            bulk_write_hook,
            status,
            started: AtomicBool::new(false),
            queue: OnceLock::new(),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Run the bootstrap sequence. May be called once.
    ///
    /// On failure the status moves to `error` carrying the cause, no path
    /// stays subscribed, and the same cause is returned wrapped in
    /// [`PersistError::Bootstrap`].
    pub async fn start(&self) -> PersistResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(PersistError::AlreadyStarted);
        }
        info!(
            name = %self.name,
            version = self.version,
            paths = self.handlers.len(),
            "bootstrap started"
        );

        match self.bootstrap().await {
            Ok(subscriptions) => {
                self.subscriptions
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend(subscriptions);
                self.set_state(PersistState::Loaded);
                info!(name = %self.name, "persistence loaded");
                Ok(())
            }
            Err(e) => {
                error!(name = %self.name, error = %e, "bootstrap failed");
                let cause = Arc::new(e);
                self.set_state(PersistState::Error(Arc::clone(&cause)));
                Err(PersistError::Bootstrap(cause))
            }
        }
    }

    async fn bootstrap(&self) -> PersistResult<Vec<Subscription>> {
        let storage = self.provider.get_storage().await?;
        // Built here so the queue keeps this runtime for background flushes.
        let queue = Arc::clone(self.queue.get_or_init(|| {
            Arc::new(WriteQueue::new(
                Arc::clone(&storage),
                Arc::clone(&self.write_hook),
            ))
        }));

        let all_keys = if self
            .handlers
            .iter()
            .any(|h| h.strategy() == Strategy::MultiFile)
        {
            Some(storage.get_all_keys().await?)
        } else {
            None
        };

        let storage: &dyn StorageEngine = storage.as_ref();
        let subscriptions = try_join_all(self.handlers.iter().map(|handler| {
            handler.activate(
                self.tree.as_ref(),
                storage,
                all_keys.as_deref(),
                &queue,
                &self.bulk_write_hook,
            )
        }))
        .await?;

        MigrationRunner::new(storage, &self.keys, &self.migrations, self.version)
            .run()
            .await?;
        Ok(subscriptions)
    }

    /// Move the status out of `loading` and mirror it into the tree.
    fn set_state(&self, next: PersistState) {
        let mut mirrored = None;
        self.status.send_if_modified(|status| match status.transition(next) {
            Ok(()) => {
                mirrored = Some(status.to_snapshot());
                true
            }
            Err(e) => {
                warn!(error = %e, "status transition ignored");
                false
            }
        });
        if let Some(snapshot) = mirrored {
            if let Err(e) = self.tree.set(&[STATUS_FIELD.to_string()], snapshot) {
                warn!(error = %e, "could not mirror status into the tree");
            }
        }
    }

    /// Current status.
    pub fn status(&self) -> PersistStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<PersistStatus> {
        self.status.subscribe()
    }

    /// Dispatch every pending write now, bypassing the bulk write hook.
    pub async fn flush(&self) -> PersistResult<FlushReport> {
        let queue = self.queue.get().ok_or(PersistError::NotStarted)?;
        Ok(queue.flush().await)
    }

    /// Storage keys with a pending write.
    pub fn pending_keys(&self) -> Vec<String> {
        self.queue
            .get()
            .map(|queue| queue.pending_keys())
            .unwrap_or_default()
    }

    /// Stop watching the tree. Pending writes stay queued.
    pub fn stop(&self) {
        let subscriptions = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        info!(name = %self.name, subscriptions = subscriptions.len(), "persistence stopped");
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
    }

    pub fn tree(&self) -> &Arc<dyn ObservableTree> {
        &self.tree
    }

    pub fn keys(&self) -> &KeyScheme {
        &self.keys
    }

    /// Configured paths and their strategies.
    pub fn paths(&self) -> impl Iterator<Item = (&DotPath, Strategy)> + '_ {
        self.handlers.iter().map(|h| (h.path(), h.strategy()))
    }
}

impl std::fmt::Debug for PersistEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistEngine")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("handlers", &self.handlers)
            .field("status", &self.status.borrow().state().label())
            .field("pending", &self.pending_keys())
            .finish_non_exhaustive()
    }
}
