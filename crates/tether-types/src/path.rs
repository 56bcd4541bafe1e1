//! Dot-separated paths into the tree.
//!
//! Valid paths:
//! - The empty string, meaning the whole tree
//! - Otherwise one or more non-empty segments joined by `.`
//! - The first segment must not be the reserved status field

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TypesError, TypesResult};
use crate::key::STATUS_FIELD;

/// A parsed, validated dot path.
///
/// # Examples
///
/// ```
/// use tether_types::DotPath;
///
/// let path = DotPath::parse("settings.theme").unwrap();
/// assert_eq!(path.parent(), ["settings".to_string()]);
/// assert_eq!(path.leaf(), Some("theme"));
/// assert!(DotPath::parse("").unwrap().is_root());
/// assert!(DotPath::parse("a..b").is_err());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DotPath {
    raw: String,
    segments: Vec<String>,
}

impl DotPath {
    /// The whole-tree path.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> TypesResult<Self> {
        if raw.is_empty() {
            return Ok(Self::root());
        }
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(TypesError::InvalidPath {
                path: raw.to_string(),
                reason: "segments must not be empty".into(),
            });
        }
        if segments[0] == STATUS_FIELD {
            return Err(TypesError::InvalidPath {
                path: raw.to_string(),
                reason: format!("{STATUS_FIELD:?} is reserved for persistence status"),
            });
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Every segment but the last. Empty for the root and for one-segment paths.
    pub fn parent(&self) -> &[String] {
        match self.segments.split_last() {
            Some((_, parent)) => parent,
            None => &[],
        }
    }

    /// The last segment, or `None` for the root.
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Segments of the child `key` beneath this path.
    pub fn child_segments(&self, key: &str) -> Vec<String> {
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        segments
    }
}

impl FromStr for DotPath {
    type Err = TypesError;

    fn from_str(s: &str) -> TypesResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DotPath {
    type Error = TypesError;

    fn try_from(s: String) -> TypesResult<Self> {
        Self::parse(&s)
    }
}

impl From<DotPath> for String {
    fn from(path: DotPath) -> Self {
        path.raw
    }
}

impl fmt::Display for DotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
