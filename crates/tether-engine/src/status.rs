//! Persistence status.
//!
//! Status starts at `loading` and moves exactly once, to `loaded` or to
//! `error`. It is mirrored into the tree's `_persist` field as
//! `{status, loading, loaded, error, version}`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tether_types::Snapshot;

use crate::error::{PersistError, PersistResult};

/// Which phase persistence is in.
#[derive(Clone, Debug)]
pub enum PersistState {
    Loading,
    Loaded,
    Error(Arc<PersistError>),
}

impl PersistState {
    pub fn label(&self) -> &'static str {
        match self {
            PersistState::Loading => "loading",
            PersistState::Loaded => "loaded",
            PersistState::Error(_) => "error",
        }
    }
}

/// Current status plus the configured schema version.
#[derive(Clone, Debug)]
pub struct PersistStatus {
    state: PersistState,
    version: u32,
}

impl PersistStatus {
    pub fn loading(version: u32) -> Self {
        Self {
            state: PersistState::Loading,
            version,
        }
    }

    pub fn state(&self) -> &PersistState {
        &self.state
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, PersistState::Loading)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, PersistState::Loaded)
    }

    pub fn error(&self) -> Option<&Arc<PersistError>> {
        match &self.state {
            PersistState::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Move out of `loading`. Every other transition is rejected and leaves
    /// the status untouched.
    pub fn transition(&mut self, next: PersistState) -> PersistResult<()> {
        if !self.is_loading() || matches!(next, PersistState::Loading) {
            return Err(PersistError::InvalidTransition {
                from: self.state.label(),
                to: next.label(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// The `_persist` field value.
    pub fn to_snapshot(&self) -> Snapshot {
        let error = match &self.state {
            PersistState::Error(e) => Value::String(e.to_string()),
            _ => Value::Null,
        };
        let fields: BTreeMap<String, Snapshot> = [
            ("status", Value::from(self.state.label())),
            ("loading", Value::from(self.is_loading())),
            ("loaded", Value::from(self.is_loaded())),
            ("error", error),
            ("version", Value::from(self.version)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), Snapshot::from(v)))
        .collect();
        Snapshot::object(fields)
    }
}
