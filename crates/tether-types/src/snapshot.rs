//! Immutable, structurally shared tree values.
//!
//! A [`Snapshot`] is a reference-counted pointer to a [`Node`]. Cloning a
//! snapshot clones the pointer, never the data. Mutating helpers such as
//! [`Snapshot::set_in`] copy-on-write only the nodes along the mutated path,
//! so every untouched subtree keeps its identity. That identity is what the
//! diff engine compares.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, Serializer};
use serde::{Deserialize, Deserializer};
use serde_json::{Number, Value};

use crate::error::{TypesError, TypesResult};

/// One level of a snapshot tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Snapshot>),
    Object(BTreeMap<String, Snapshot>),
}

/// Shared immutable handle to a [`Node`].
#[derive(Clone)]
pub struct Snapshot(Arc<Node>);

impl Snapshot {
    /// Wrap a node in a fresh snapshot.
    pub fn new(node: Node) -> Self {
        Self(Arc::new(node))
    }

    /// A fresh `null` snapshot.
    pub fn null() -> Self {
        Self::new(Node::Null)
    }

    /// A fresh object snapshot from its entries.
    pub fn object(entries: BTreeMap<String, Snapshot>) -> Self {
        Self::new(Node::Object(entries))
    }

    /// A fresh empty object snapshot.
    pub fn empty_object() -> Self {
        Self::object(BTreeMap::new())
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    /// Identity comparison: `true` only if both handles point at the same node.
    pub fn ptr_eq(a: &Snapshot, b: &Snapshot) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub fn is_object(&self) -> bool {
        matches!(*self.0, Node::Object(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(*self.0, Node::Null)
    }

    /// The entries of an object snapshot, or `None` for any other node.
    pub fn as_object(&self) -> Option<&BTreeMap<String, Snapshot>> {
        match &*self.0 {
            Node::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a direct child of an object snapshot.
    pub fn get(&self, key: &str) -> Option<&Snapshot> {
        self.as_object()?.get(key)
    }

    /// Follow `path` through nested objects. The empty path yields `self`.
    pub fn get_path(&self, path: &[String]) -> Option<&Snapshot> {
        let mut current = self;
        for segment in path {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// A copy of this object without `key`. Non-objects are returned as-is.
    ///
    /// Children keep their identity; only the top node is new.
    pub fn without_key(&self, key: &str) -> Snapshot {
        match &*self.0 {
            Node::Object(map) if map.contains_key(key) => {
                let mut map = map.clone();
                map.remove(key);
                Snapshot::object(map)
            }
            _ => self.clone(),
        }
    }

    /// Shallow merge: entries of `incoming` overwrite same-named entries of
    /// `self`. Returns `None` unless both sides are objects.
    pub fn shallow_merge(&self, incoming: &Snapshot) -> Option<Snapshot> {
        let base = self.as_object()?;
        let overlay = incoming.as_object()?;
        let mut merged = base.clone();
        for (key, value) in overlay {
            merged.insert(key.clone(), value.clone());
        }
        Some(Snapshot::object(merged))
    }

    /// Replace the value at `path`, returning the previous value if any.
    ///
    /// Intermediate segments must already exist as objects. The empty path
    /// replaces `self` wholesale.
    pub fn set_in(&mut self, path: &[String], value: Snapshot) -> TypesResult<Option<Snapshot>> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(Some(std::mem::replace(self, value)));
        };
        if rest.is_empty() {
            if !self.is_object() {
                return Err(TypesError::NotAnObject {
                    segment: first.clone(),
                });
            }
        } else {
            match self.get(first) {
                Some(child) if child.is_object() => {}
                Some(_) => {
                    return Err(TypesError::NotAnObject {
                        segment: first.clone(),
                    })
                }
                None => {
                    return Err(TypesError::MissingSegment {
                        segment: first.clone(),
                    })
                }
            }
        }

        match Arc::make_mut(&mut self.0) {
            Node::Object(map) if rest.is_empty() => Ok(map.insert(first.clone(), value)),
            Node::Object(map) => match map.get_mut(first) {
                Some(child) => child.set_in(rest, value),
                None => Err(TypesError::MissingSegment {
                    segment: first.clone(),
                }),
            },
            _ => Err(TypesError::NotAnObject {
                segment: first.clone(),
            }),
        }
    }

    /// Remove the value at `path`, returning it if it existed.
    ///
    /// Nothing is copied when the target is absent.
    pub fn remove_in(&mut self, path: &[String]) -> TypesResult<Option<Snapshot>> {
        let Some((leaf, parent)) = path.split_last() else {
            return Err(TypesError::InvalidPath {
                path: String::new(),
                reason: "the root cannot be removed".into(),
            });
        };
        match self.get_path(parent) {
            Some(p) if p.get(leaf).is_some() => {}
            _ => return Ok(None),
        }
        self.remove_existing(path)
    }

    fn remove_existing(&mut self, path: &[String]) -> TypesResult<Option<Snapshot>> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(None);
        };
        match Arc::make_mut(&mut self.0) {
            Node::Object(map) if rest.is_empty() => Ok(map.remove(first)),
            Node::Object(map) => match map.get_mut(first) {
                Some(child) => child.remove_existing(rest),
                None => Ok(None),
            },
            _ => Err(TypesError::NotAnObject {
                segment: first.clone(),
            }),
        }
    }

    /// Deep-convert into a plain JSON value.
    pub fn to_value(&self) -> Value {
        match &*self.0 {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => Value::Number(n.clone()),
            Node::String(s) => Value::String(s.clone()),
            Node::Array(items) => Value::Array(items.iter().map(Snapshot::to_value).collect()),
            Node::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }

    /// Serialize to compact JSON text.
    pub fn to_json(&self) -> TypesResult<String> {
        serde_json::to_string(self).map_err(|e| TypesError::Serialization(e.to_string()))
    }

    /// Parse JSON text into a fresh snapshot.
    pub fn from_json(text: &str) -> TypesResult<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| TypesError::Serialization(e.to_string()))?;
        Ok(Self::from(value))
    }
}

impl From<Value> for Snapshot {
    fn from(value: Value) -> Self {
        let node = match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => Node::Number(n),
            Value::String(s) => Node::String(s),
            Value::Array(items) => Node::Array(items.into_iter().map(Snapshot::from).collect()),
            Value::Object(map) => Node::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Snapshot::from(v)))
                    .collect(),
            ),
        };
        Snapshot::new(node)
    }
}

/// Deep equality. Shares a fast path with identity.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        Snapshot::ptr_eq(self, other) || self.0 == other.0
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Snapshot({})", self.to_value())
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &*self.0 {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Number(n) => n.serialize(serializer),
            Node::String(s) => serializer.serialize_str(s),
            Node::Array(items) => serializer.collect_seq(items),
            Node::Object(map) => serializer.collect_map(map),
        }
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Snapshot::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn value_conversion_is_lossless() {
        let value = json!({"a": [1, 2.5, "x"], "b": {"c": null, "d": true}});
        let snap = Snapshot::from(value.clone());
        assert_eq!(snap.to_value(), value);
    }

    #[test]
    fn json_text_matches_serde_json() {
        let value = json!({"counter": 3, "tags": ["a", "b"]});
        let snap = Snapshot::from(value.clone());
        assert_eq!(snap.to_json().unwrap(), serde_json::to_string(&value).unwrap());
        assert_eq!(Snapshot::from_json(&snap.to_json().unwrap()).unwrap(), snap);
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = Snapshot::from_json("{not json").unwrap_err();
        assert!(matches!(err, TypesError::Serialization(_)));
    }

    #[test]
    fn clone_shares_identity() {
        let a = Snapshot::from(json!({"x": 1}));
        let b = a.clone();
        assert!(Snapshot::ptr_eq(&a, &b));
    }

    #[test]
    fn equal_but_distinct_values_differ_by_identity() {
        let a = Snapshot::from(json!({"x": 1}));
        let b = Snapshot::from(json!({"x": 1}));
        assert_eq!(a, b);
        assert!(!Snapshot::ptr_eq(&a, &b));
    }

    // -----------------------------------------------------------------------
    // Copy-on-write
    // -----------------------------------------------------------------------

    #[test]
    fn set_in_preserves_untouched_siblings() {
        let mut root = Snapshot::from(json!({"a": {"x": 1}, "b": {"y": 2}}));
        let before = root.clone();

        root.set_in(&path(&["a", "x"]), Snapshot::from(json!(5)))
            .unwrap();

        assert!(Snapshot::ptr_eq(before.get("b").unwrap(), root.get("b").unwrap()));
        assert!(!Snapshot::ptr_eq(before.get("a").unwrap(), root.get("a").unwrap()));
        assert_eq!(before.get_path(&path(&["a", "x"])).unwrap().to_value(), json!(1));
        assert_eq!(root.get_path(&path(&["a", "x"])).unwrap().to_value(), json!(5));
    }

    #[test]
    fn set_in_returns_previous_value() {
        let mut root = Snapshot::from(json!({"n": 1}));
        let prev = root.set_in(&path(&["n"]), Snapshot::from(json!(2))).unwrap();
        assert_eq!(prev.unwrap().to_value(), json!(1));
        let prev = root.set_in(&path(&["m"]), Snapshot::from(json!(3))).unwrap();
        assert!(prev.is_none());
    }

    #[test]
    fn set_in_rejects_missing_intermediate() {
        let mut root = Snapshot::from(json!({}));
        let err = root
            .set_in(&path(&["missing", "leaf"]), Snapshot::null())
            .unwrap_err();
        assert_eq!(
            err,
            TypesError::MissingSegment {
                segment: "missing".into()
            }
        );
    }

    #[test]
    fn set_in_rejects_non_object_parent() {
        let mut root = Snapshot::from(json!({"n": 1}));
        let err = root
            .set_in(&path(&["n", "leaf"]), Snapshot::null())
            .unwrap_err();
        assert!(matches!(err, TypesError::NotAnObject { .. }));
    }

    #[test]
    fn set_in_empty_path_replaces_root() {
        let mut root = Snapshot::from(json!({"a": 1}));
        root.set_in(&[], Snapshot::from(json!([1]))).unwrap();
        assert_eq!(root.to_value(), json!([1]));
    }

    #[test]
    fn remove_in_absent_key_keeps_identity() {
        let mut root = Snapshot::from(json!({"a": {"x": 1}}));
        let before = root.clone();
        assert!(root.remove_in(&path(&["a", "nope"])).unwrap().is_none());
        assert!(Snapshot::ptr_eq(&before, &root));
    }

    #[test]
    fn remove_in_removes_nested_key() {
        let mut root = Snapshot::from(json!({"a": {"x": 1, "y": 2}}));
        let removed = root.remove_in(&path(&["a", "x"])).unwrap();
        assert_eq!(removed.unwrap().to_value(), json!(1));
        assert_eq!(root.to_value(), json!({"a": {"y": 2}}));
    }

    #[test]
    fn remove_root_is_rejected() {
        let mut root = Snapshot::empty_object();
        assert!(root.remove_in(&[]).is_err());
    }

    #[test]
    fn without_key_and_merge() {
        let root = Snapshot::from(json!({"a": 1, "_persist": {"status": "loading"}}));
        let stripped = root.without_key("_persist");
        assert_eq!(stripped.to_value(), json!({"a": 1}));
        assert!(Snapshot::ptr_eq(root.get("a").unwrap(), stripped.get("a").unwrap()));

        let merged = stripped
            .shallow_merge(&Snapshot::from(json!({"b": 2, "a": 3})))
            .unwrap();
        assert_eq!(merged.to_value(), json!({"a": 3, "b": 2}));
        assert!(stripped.shallow_merge(&Snapshot::from(json!(1))).is_none());
    }
}
