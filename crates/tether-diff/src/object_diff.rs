//! Key-level diff: compare two object snapshots.
//!
//! Objects are represented as `BTreeMap<String, Snapshot>`. The diff detects
//! key additions, removals, and identity changes. Two structurally equal but
//! distinct snapshots count as updated: a new handle means the value was
//! reassigned or mutated beneath.

use std::collections::BTreeMap;

use tether_types::Snapshot;

/// The result of comparing two objects. The three key sets are disjoint and
/// each is sorted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectDiff {
    /// Keys present only in the current object.
    pub added: Vec<String>,
    /// Keys present only in the previous object.
    pub removed: Vec<String>,
    /// Keys present in both whose snapshots are not the same handle.
    pub updated: Vec<String>,
}

impl ObjectDiff {
    /// Create an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    /// Number of changed keys.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.updated.len()
    }

    /// Every change in key order.
    pub fn changes(&self) -> Vec<KeyChange<'_>> {
        let mut changes: Vec<KeyChange<'_>> = self
            .added
            .iter()
            .map(|k| KeyChange::Added(k))
            .chain(self.updated.iter().map(|k| KeyChange::Updated(k)))
            .chain(self.removed.iter().map(|k| KeyChange::Removed(k)))
            .collect();
        changes.sort_by_key(|c| c.key());
        changes
    }
}

/// A single changed key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyChange<'a> {
    Added(&'a str),
    Updated(&'a str),
    Removed(&'a str),
}

impl<'a> KeyChange<'a> {
    pub fn key(&self) -> &'a str {
        match self {
            KeyChange::Added(k) | KeyChange::Updated(k) | KeyChange::Removed(k) => k,
        }
    }

    /// Returns `true` unless the key is gone.
    pub fn has_value(&self) -> bool {
        !matches!(self, KeyChange::Removed(_))
    }
}

/// Compute the diff between two objects.
pub fn diff_objects(
    previous: &BTreeMap<String, Snapshot>,
    current: &BTreeMap<String, Snapshot>,
) -> ObjectDiff {
    let mut diff = ObjectDiff::new();

    for (key, old_val) in previous {
        match current.get(key) {
            Some(new_val) => {
                if !Snapshot::ptr_eq(old_val, new_val) {
                    diff.updated.push(key.clone());
                }
            }
            None => diff.removed.push(key.clone()),
        }
    }

    for key in current.keys() {
        if !previous.contains_key(key) {
            diff.added.push(key.clone());
        }
    }

    diff
}

/// Compute the diff between two snapshots. A snapshot that is not an object
/// is treated as an empty object.
pub fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> ObjectDiff {
    let empty = BTreeMap::new();
    diff_objects(
        previous.as_object().unwrap_or(&empty),
        current.as_object().unwrap_or(&empty),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snap(value: serde_json::Value) -> Snapshot {
        Snapshot::from(value)
    }

    fn make_object(pairs: &[(&str, &Snapshot)]) -> BTreeMap<String, Snapshot> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), (*v).clone()))
            .collect()
    }

    #[test]
    fn identical_objects_no_diff() {
        let a = snap(json!(1));
        let obj = make_object(&[("a", &a)]);
        assert!(diff_objects(&obj, &obj).is_empty());
    }

    #[test]
    fn empty_to_populated() {
        let x = snap(json!(42));
        let y = snap(json!("new"));
        let diff = diff_objects(&BTreeMap::new(), &make_object(&[("x", &x), ("y", &y)]));
        assert_eq!(diff.added, vec!["x", "y"]);
        assert_eq!(diff.len(), 2);
    }

    #[test]
    fn populated_to_empty() {
        let x = snap(json!(42));
        let diff = diff_objects(&make_object(&[("x", &x)]), &BTreeMap::new());
        assert_eq!(diff.removed, vec!["x"]);
        assert_eq!(diff.changes(), vec![KeyChange::Removed("x")]);
    }

    #[test]
    fn equal_content_new_handle_is_updated() {
        let old = snap(json!({"debug": false}));
        let new = snap(json!({"debug": false}));
        let diff = diff_objects(&make_object(&[("config", &old)]), &make_object(&[("config", &new)]));
        assert_eq!(diff.updated, vec!["config"]);
    }

    #[test]
    fn mixed_changes() {
        let keep = snap(json!(true));
        let before = snap(json!("old"));
        let after = snap(json!("new"));
        let gone = snap(json!(42));
        let fresh = snap(json!([1, 2, 3]));

        let diff = diff_objects(
            &make_object(&[("keep", &keep), ("modify", &before), ("remove", &gone)]),
            &make_object(&[("keep", &keep), ("modify", &after), ("added", &fresh)]),
        );
        assert_eq!(diff.added, vec!["added"]);
        assert_eq!(diff.removed, vec!["remove"]);
        assert_eq!(diff.updated, vec!["modify"]);
        assert_eq!(
            diff.changes(),
            vec![
                KeyChange::Added("added"),
                KeyChange::Updated("modify"),
                KeyChange::Removed("remove"),
            ]
        );
        assert!(diff.changes()[0].has_value());
        assert!(!diff.changes()[2].has_value());
    }

    #[test]
    fn non_objects_diff_as_empty() {
        let diff = diff_snapshots(&snap(json!(null)), &snap(json!({"a": 1})));
        assert_eq!(diff.added, vec!["a"]);
        let diff = diff_snapshots(&snap(json!({"a": 1})), &snap(json!([1])));
        assert_eq!(diff.removed, vec!["a"]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Objects over a small key space whose values come from a shared
        /// pool, so identical handles appear on both sides.
        fn object_from(indices: &BTreeMap<String, usize>, pool: &[Snapshot]) -> BTreeMap<String, Snapshot> {
            indices
                .iter()
                .map(|(k, i)| (k.clone(), pool[*i].clone()))
                .collect()
        }

        fn indices() -> impl Strategy<Value = BTreeMap<String, usize>> {
            prop::collection::btree_map("[a-f]", 0usize..4, 0..6)
        }

        proptest! {
            #[test]
            fn sets_are_disjoint_and_complete(prev in indices(), cur in indices()) {
                let pool: Vec<Snapshot> = (0..4).map(|i| snap(json!({"v": i}))).collect();
                let a = object_from(&prev, &pool);
                let b = object_from(&cur, &pool);
                let diff = diff_objects(&a, &b);

                for key in &diff.added {
                    prop_assert!(!diff.removed.contains(key));
                    prop_assert!(!diff.updated.contains(key));
                    prop_assert!(b.contains_key(key) && !a.contains_key(key));
                }
                for key in &diff.removed {
                    prop_assert!(!diff.updated.contains(key));
                    prop_assert!(a.contains_key(key) && !b.contains_key(key));
                }
                for (key, value) in &b {
                    if !diff.added.contains(key) && !diff.updated.contains(key) {
                        prop_assert!(Snapshot::ptr_eq(value, &a[key]));
                    }
                }
                for key in &diff.updated {
                    prop_assert!(!Snapshot::ptr_eq(&a[key], &b[key]));
                }
            }

            #[test]
            fn self_diff_is_empty(prev in indices()) {
                let pool: Vec<Snapshot> = (0..4).map(|i| snap(json!(i))).collect();
                let a = object_from(&prev, &pool);
                prop_assert!(diff_objects(&a, &a.clone()).is_empty());
            }
        }
    }
}
