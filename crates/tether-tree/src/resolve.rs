//! Path resolution against the live tree.
//!
//! A configured [`DotPath`] is checked once, at setup: every intermediate
//! segment must already exist as an object. The leaf itself may be absent;
//! it is created by the first load. Values are then looked up lazily on each
//! access, never cached.

use tether_types::{DotPath, Snapshot};

use crate::error::{TreeError, TreeResult};
use crate::traits::ObservableTree;

/// A dot path whose parent chain exists in the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPath {
    path: DotPath,
}

impl ResolvedPath {
    pub fn path(&self) -> &DotPath {
        &self.path
    }

    /// Segments of the parent object (empty when the parent is the root).
    pub fn parent(&self) -> &[String] {
        self.path.parent()
    }

    /// The leaf key, or `None` when the path is the whole tree.
    pub fn leaf(&self) -> Option<&str> {
        self.path.leaf()
    }

    /// Current value at the path.
    pub fn value(&self, tree: &dyn ObservableTree) -> Option<Snapshot> {
        tree.get(self.path.segments())
    }
}

/// Check `path` against the current tree.
pub fn resolve(tree: &dyn ObservableTree, path: &DotPath) -> TreeResult<ResolvedPath> {
    let root = tree.snapshot();
    let mut current = &root;
    for segment in path.parent() {
        current = match current.get(segment) {
            Some(child) if child.is_object() => child,
            Some(_) => {
                return Err(TreeError::NotAnObject {
                    path: path.to_string(),
                    segment: segment.clone(),
                })
            }
            None => {
                return Err(TreeError::MissingParent {
                    path: path.to_string(),
                    segment: segment.clone(),
                })
            }
        };
    }
    Ok(ResolvedPath { path: path.clone() })
}
