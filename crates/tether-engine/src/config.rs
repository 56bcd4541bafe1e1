use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tether_store::StorageProvider;
use tether_types::{DotPath, Snapshot, Strategy};

use crate::error::{PersistError, PersistResult};
use crate::hooks::{BulkWriteHook, ImmediateWrite, SpawnBulkWrite, WriteHook};
use crate::migrate::{Migration, Migrations};

/// Which paths are persisted, and how.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Strategies {
    /// One strategy for the whole tree.
    Global(Strategy),
    /// Independently configured dot paths.
    PerPath(BTreeMap<String, Strategy>),
}

impl Strategies {
    /// Parse every configured path.
    pub fn entries(&self) -> PersistResult<Vec<(DotPath, Strategy)>> {
        match self {
            Strategies::Global(strategy) => Ok(vec![(DotPath::root(), *strategy)]),
            Strategies::PerPath(paths) => paths
                .iter()
                .map(|(raw, strategy)| {
                    DotPath::parse(raw)
                        .map(|path| (path, *strategy))
                        .map_err(|e| PersistError::config(raw.as_str(), e.to_string()))
                })
                .collect(),
        }
    }
}

/// Plain-data part of the configuration; loadable from JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistOptions {
    /// Namespace prefix of every storage key.
    pub name: String,
    /// Current schema version.
    pub version: u32,
    pub strategies: Strategies,
}

impl PersistOptions {
    pub fn validate(&self) -> PersistResult<()> {
        if self.name.is_empty() {
            return Err(PersistError::config("", "name must not be empty"));
        }
        if let Strategies::PerPath(paths) = &self.strategies {
            if paths.is_empty() {
                return Err(PersistError::config("", "no paths configured"));
            }
        }
        self.strategies.entries().map(|_| ())
    }
}

/// Everything the engine needs, supplied once at construction.
pub struct PersistConfig {
    pub options: PersistOptions,
    /// Seed value of the tree. Must be an object.
    pub initial_state: Snapshot,
    pub migrations: Migrations,
    pub storage: Arc<dyn StorageProvider>,
    pub write_hook: Arc<dyn WriteHook>,
    pub bulk_write_hook: Arc<dyn BulkWriteHook>,
}

impl PersistConfig {
    pub fn builder(name: impl Into<String>) -> PersistConfigBuilder {
        PersistConfigBuilder {
            name: name.into(),
            version: 0,
            initial_state: Snapshot::empty_object(),
            global: None,
            paths: BTreeMap::new(),
            migrations: Migrations::new(),
            storage: None,
            write_hook: Arc::new(ImmediateWrite),
            bulk_write_hook: Arc::new(SpawnBulkWrite),
        }
    }

    /// Start a builder from deserialized options.
    pub fn from_options(options: PersistOptions) -> PersistConfigBuilder {
        let mut builder = Self::builder(options.name).version(options.version);
        builder = match options.strategies {
            Strategies::Global(strategy) => builder.strategy(strategy),
            Strategies::PerPath(paths) => paths
                .into_iter()
                .fold(builder, |b, (path, strategy)| b.path(path, strategy)),
        };
        builder
    }
}

impl fmt::Debug for PersistConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistConfig")
            .field("options", &self.options)
            .field("initial_state", &self.initial_state)
            .field("migrations", &self.migrations.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder for [`PersistConfig`].
pub struct PersistConfigBuilder {
    name: String,
    version: u32,
    initial_state: Snapshot,
    global: Option<Strategy>,
    paths: BTreeMap<String, Strategy>,
    migrations: Migrations,
    storage: Option<Arc<dyn StorageProvider>>,
    write_hook: Arc<dyn WriteHook>,
    bulk_write_hook: Arc<dyn BulkWriteHook>,
}

impl PersistConfigBuilder {
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn initial_state(mut self, state: impl Into<Snapshot>) -> Self {
        self.initial_state = state.into();
        self
    }

    /// Persist the whole tree with `strategy`.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.global = Some(strategy);
        self
    }

    /// Persist the subtree at dot path `path` with `strategy`.
    pub fn path(mut self, path: impl Into<String>, strategy: Strategy) -> Self {
        self.paths.insert(path.into(), strategy);
        self
    }

    /// Register the migration that brings state up to `version`.
    pub fn migration(mut self, version: u32, migration: impl Migration + 'static) -> Self {
        self.migrations.insert(version, Arc::new(migration));
        self
    }

    pub fn storage(mut self, provider: impl StorageProvider + 'static) -> Self {
        self.storage = Some(Arc::new(provider));
        self
    }

    pub fn write_hook(mut self, hook: impl WriteHook + 'static) -> Self {
        self.write_hook = Arc::new(hook);
        self
    }

    pub fn bulk_write_hook(mut self, hook: impl BulkWriteHook + 'static) -> Self {
        self.bulk_write_hook = Arc::new(hook);
        self
    }

    pub fn build(self) -> PersistResult<PersistConfig> {
        let strategies = match (self.global, self.paths.is_empty()) {
            (Some(strategy), true) => Strategies::Global(strategy),
            (None, false) => Strategies::PerPath(self.paths),
            (Some(_), false) => {
                return Err(PersistError::config(
                    "",
                    "configure either one global strategy or per-path strategies, not both",
                ))
            }
            (None, true) => return Err(PersistError::config("", "no strategy configured")),
        };
        let storage = self
            .storage
            .ok_or_else(|| PersistError::config("", "no storage provider configured"))?;
        if !self.initial_state.is_object() {
            return Err(PersistError::config("", "initial state must be an object"));
        }

        let options = PersistOptions {
            name: self.name,
            version: self.version,
            strategies,
        };
        options.validate()?;

        Ok(PersistConfig {
            options,
            initial_state: self.initial_state,
            migrations: self.migrations,
            storage,
            write_hook: self.write_hook,
            bulk_write_hook: self.bulk_write_hook,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_store::{InMemoryStorage, StorageEngine};

    fn storage() -> Arc<dyn StorageEngine> {
        Arc::new(InMemoryStorage::new())
    }

    #[test]
    fn options_from_json_global() {
        let options: PersistOptions = serde_json::from_value(json!({
            "name": "app",
            "version": 2,
            "strategies": "singleFile"
        }))
        .unwrap();
        assert_eq!(options.strategies, Strategies::Global(Strategy::SingleFile));
        options.validate().unwrap();
    }

    #[test]
    fn options_from_json_per_path() {
        let options: PersistOptions = serde_json::from_value(json!({
            "name": "app",
            "version": 0,
            "strategies": {"photos": "multiFile", "settings.ui": "singleFile"}
        }))
        .unwrap();
        let entries = options.strategies.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0.as_str(), "photos");
        assert_eq!(entries[0].1, Strategy::MultiFile);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let result: Result<PersistOptions, _> = serde_json::from_value(json!({
            "name": "app",
            "version": 0,
            "strategies": {"photos": "sharded"}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn invalid_path_is_a_configuration_error() {
        let options = PersistOptions {
            name: "app".into(),
            version: 0,
            strategies: Strategies::PerPath(BTreeMap::from([(
                "a..b".to_string(),
                Strategy::SingleFile,
            )])),
        };
        assert!(matches!(
            options.validate(),
            Err(PersistError::Configuration { path, .. }) if path == "a..b"
        ));
    }

    #[test]
    fn builder_defaults() {
        let config = PersistConfig::builder("app")
            .strategy(Strategy::SingleFile)
            .storage(storage())
            .build()
            .unwrap();
        assert_eq!(config.options.version, 0);
        assert_eq!(config.initial_state.to_value(), json!({}));
        assert!(config.migrations.is_empty());
    }

    #[test]
    fn builder_requires_storage_and_strategy() {
        assert!(PersistConfig::builder("app")
            .strategy(Strategy::SingleFile)
            .build()
            .is_err());
        assert!(PersistConfig::builder("app").storage(storage()).build().is_err());
    }

    #[test]
    fn builder_rejects_mixed_and_non_object_state() {
        assert!(PersistConfig::builder("app")
            .strategy(Strategy::SingleFile)
            .path("photos", Strategy::MultiFile)
            .storage(storage())
            .build()
            .is_err());
        assert!(PersistConfig::builder("app")
            .strategy(Strategy::SingleFile)
            .initial_state(json!([1, 2]))
            .storage(storage())
            .build()
            .is_err());
        assert!(PersistConfig::builder("")
            .strategy(Strategy::SingleFile)
            .storage(storage())
            .build()
            .is_err());
    }

    #[test]
    fn builder_from_options_keeps_paths() {
        let options = PersistOptions {
            name: "app".into(),
            version: 4,
            strategies: Strategies::PerPath(BTreeMap::from([(
                "photos".to_string(),
                Strategy::MultiFile,
            )])),
        };
        let config = PersistConfig::from_options(options.clone())
            .storage(storage())
            .migration(4, || async { anyhow::Ok(()) })
            .build()
            .unwrap();
        assert_eq!(config.options, options);
        assert_eq!(config.migrations.keys().copied().collect::<Vec<_>>(), vec![4]);
    }
}
