//! Storage key naming.
//!
//! Every record lives under the `{name}-` namespace:
//!
//! - `{name}-{path}` -- a whole-subtree record (`{name}-` for the whole tree)
//! - `{name}-{path}.{key}` -- one per-key record of an object-valued path
//!   (`{name}-{key}` when the path is the whole tree)
//! - `{name}-_persist` -- the schema-version meta record

use crate::path::DotPath;

/// Tree field holding persistence status. Never persisted as data.
pub const STATUS_FIELD: &str = "_persist";

/// Builds and recognizes the storage keys of one named store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyScheme {
    prefix: String,
}

impl KeyScheme {
    pub fn new(name: &str) -> Self {
        Self {
            prefix: format!("{name}-"),
        }
    }

    /// The `{name}-` namespace shared by every key.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of the whole-subtree record for `path`.
    pub fn record_key(&self, path: &DotPath) -> String {
        format!("{}{}", self.prefix, path.as_str())
    }

    /// Key of the per-key record for `key` beneath `path`.
    pub fn child_key(&self, path: &DotPath, key: &str) -> String {
        if path.is_root() {
            format!("{}{key}", self.prefix)
        } else {
            format!("{}{}.{key}", self.prefix, path.as_str())
        }
    }

    /// Key of the schema-version meta record.
    pub fn meta_key(&self) -> String {
        format!("{}{STATUS_FIELD}", self.prefix)
    }

    /// If `storage_key` is a per-key record directly beneath `path`, the
    /// child key it stores. Keys nested deeper, keys outside the namespace,
    /// and the meta record yield `None`.
    pub fn child_of<'a>(&self, storage_key: &'a str, path: &DotPath) -> Option<&'a str> {
        let rest = storage_key.strip_prefix(self.prefix.as_str())?;
        let child = if path.is_root() {
            rest
        } else {
            rest.strip_prefix(path.as_str())?.strip_prefix('.')?
        };
        if child.is_empty() || child.contains('.') || (path.is_root() && child == STATUS_FIELD) {
            return None;
        }
        Some(child)
    }
}
