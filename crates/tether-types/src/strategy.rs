use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Storage layout for one configured path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Strategy {
    /// The whole subtree is one record.
    SingleFile,
    /// Each top-level key of an object-valued subtree is its own record.
    MultiFile,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::SingleFile => "singleFile",
            Strategy::MultiFile => "multiFile",
        }
    }
}

impl FromStr for Strategy {
    type Err = TypesError;

    /// Accepts camel, snake, and kebab spellings, case-insensitively.
    fn from_str(s: &str) -> Result<Self, TypesError> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "singlefile" => Ok(Strategy::SingleFile),
            "multifile" => Ok(Strategy::MultiFile),
            _ => Err(TypesError::UnknownStrategy(s.to_string())),
        }
    }
}

impl TryFrom<String> for Strategy {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self, TypesError> {
        s.parse()
    }
}

impl From<Strategy> for String {
    fn from(strategy: Strategy) -> Self {
        strategy.as_str().to_string()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
