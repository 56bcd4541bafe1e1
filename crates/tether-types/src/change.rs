//! Tree mutation records.
//!
//! A [`Mutation`] is a request to change the tree; a [`ChangeOp`] is the
//! record an observable tree emits after applying one. Subscribers receive
//! change operations as ordered batches, one batch per applied mutation set.

use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

/// What happened at a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Replace,
    Remove,
}

/// A single applied change, addressed by path segments from the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeOp {
    pub kind: ChangeKind,
    pub path: Vec<String>,
}

impl ChangeOp {
    pub fn new(kind: ChangeKind, path: Vec<String>) -> Self {
        Self { kind, path }
    }

    /// Returns `true` if this change lands inside the top-level field `field`.
    pub fn targets_field(&self, field: &str) -> bool {
        self.path.first().is_some_and(|first| first == field)
    }

    /// Returns `true` if this change alters the value observed at `path`:
    /// either it writes at or beneath `path`, or it replaces an ancestor.
    pub fn touches(&self, path: &[String]) -> bool {
        let shared = self.path.len().min(path.len());
        self.path[..shared] == path[..shared]
    }
}

/// A requested change to the tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    Set { path: Vec<String>, value: Snapshot },
    Remove { path: Vec<String> },
}

impl Mutation {
    pub fn set(path: &[&str], value: impl Into<Snapshot>) -> Self {
        Mutation::Set {
            path: path.iter().map(|s| s.to_string()).collect(),
            value: value.into(),
        }
    }

    pub fn remove(path: &[&str]) -> Self {
        Mutation::Remove {
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn path(&self) -> &[String] {
        match self {
            Mutation::Set { path, .. } | Mutation::Remove { path } => path,
        }
    }
}
