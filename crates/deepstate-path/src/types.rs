//! Type definitions for state paths.

use std::fmt;

/// A step in a state path.
///
/// Objects are addressed by key, sequences by index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

/// A state path, ordered from the outermost container inwards.
pub type Path = Vec<PathStep>;

impl PathStep {
    /// Returns the index if this step addresses a sequence element.
    ///
    /// A key made only of digits (`"3"`) also resolves to an index, so that
    /// sequences can be addressed with string keys the way a dynamic host
    /// would allow.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathStep::Index(index) => Some(*index),
            PathStep::Key(key) if crate::is_valid_index(key) => key.parse().ok(),
            PathStep::Key(_) => None,
        }
    }

    /// Returns the step as an object key, rendering indices in decimal.
    pub fn to_key(&self) -> String {
        match self {
            PathStep::Key(key) => key.clone(),
            PathStep::Index(index) => index.to_string(),
        }
    }
}

impl fmt::Display for PathStep {
    /// Formats the step as it would appear in the first position of a path.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::format_path(std::slice::from_ref(self)))
    }
}

impl From<&str> for PathStep {
    fn from(key: &str) -> Self {
        PathStep::Key(key.to_owned())
    }
}

impl From<String> for PathStep {
    fn from(key: String) -> Self {
        PathStep::Key(key)
    }
}

impl From<usize> for PathStep {
    fn from(index: usize) -> Self {
        PathStep::Index(index)
    }
}
