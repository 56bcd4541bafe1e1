//! Schema-version migrations.
//!
//! The meta record `{name}-_persist` holds the last schema version
//! reconciled to storage. On startup the runner compares it to the
//! configured version and runs every registered migration in
//! `(persisted, configured]`, one at a time, in ascending order. Versions
//! without a migration are skipped.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_store::StorageEngine;
use tether_types::KeyScheme;
use tracing::{info, warn};

use crate::error::{PersistError, PersistResult};

/// Transforms persisted state from the previous version to this one.
///
/// Migrations mutate the live tree directly, so they close over whatever
/// handle to the tree they need.
#[async_trait]
pub trait Migration: Send + Sync {
    async fn migrate(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> Migration for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn migrate(&self) -> anyhow::Result<()> {
        (self)().await
    }
}

/// Migrations keyed by the version they migrate to. Sparse.
pub type Migrations = BTreeMap<u32, Arc<dyn Migration>>;

/// Persisted schema-version record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRecord {
    pub version: u32,
}

/// What a migration run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Version found in storage, or `None` on first run.
    pub persisted: Option<u32>,
    /// Versions whose migration ran, in order.
    pub applied: Vec<u32>,
    /// Whether the meta record was (re)written.
    pub meta_written: bool,
}

/// Reconciles the persisted schema version with the configured one.
pub struct MigrationRunner<'a> {
    storage: &'a dyn StorageEngine,
    keys: &'a KeyScheme,
    migrations: &'a Migrations,
    target: u32,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(
        storage: &'a dyn StorageEngine,
        keys: &'a KeyScheme,
        migrations: &'a Migrations,
        target: u32,
    ) -> Self {
        Self {
            storage,
            keys,
            migrations,
            target,
        }
    }

    pub async fn read_meta(&self) -> PersistResult<Option<MetaRecord>> {
        let key = self.keys.meta_key();
        match self.storage.get_item(&key).await? {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| PersistError::Serialization {
                    key,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Run pending migrations, then record the configured version.
    ///
    /// A failing migration stops the run and leaves the meta record as it
    /// was, so the next startup retries from the same version.
    pub async fn run(&self) -> PersistResult<MigrationOutcome> {
        let persisted = self.read_meta().await?.map(|meta| meta.version);
        let mut outcome = MigrationOutcome {
            persisted,
            ..Default::default()
        };

        match persisted {
            Some(from) if from < self.target => {
                for (&version, migration) in self.migrations.range(from + 1..=self.target) {
                    info!(from, version, "running migration");
                    migration
                        .migrate()
                        .await
                        .map_err(|source| PersistError::Migration { version, source })?;
                    outcome.applied.push(version);
                }
            }
            Some(from) if from > self.target => {
                warn!(
                    persisted = from,
                    configured = self.target,
                    "persisted schema is newer than configured; no migrations run"
                );
            }
            _ => {}
        }

        if persisted != Some(self.target) {
            let record = serde_json::to_string(&MetaRecord {
                version: self.target,
            })
            .map_err(|e| PersistError::Serialization {
                key: self.keys.meta_key(),
                reason: e.to_string(),
            })?;
            self.storage.set_item(&self.keys.meta_key(), &record).await?;
            outcome.meta_written = true;
            info!(version = self.target, "schema version recorded");
        }
        Ok(outcome)
    }
}
