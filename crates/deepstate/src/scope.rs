//! Consumer scopes: which changed paths a consumer wants to hear about.

use indexmap::IndexSet;

use deepstate_path::is_prefix_str;

/// Scope entry that matches every change.
pub const WILDCARD: &str = "*";

/// The set of paths a consumer watches.
///
/// A fresh scope is empty and matches nothing. It grows through tracked
/// reads and is replaced wholesale by `watch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Paths(IndexSet<String>),
    Any,
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Paths(IndexSet::new())
    }
}

impl Scope {
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scope = Scope::default();
        for path in paths {
            scope.insert(path.into());
        }
        scope
    }

    /// `true` until the first entry is added.
    pub fn is_unscoped(&self) -> bool {
        matches!(self, Scope::Paths(paths) if paths.is_empty())
    }

    pub fn insert(&mut self, path: String) {
        match self {
            Scope::Any => {}
            Scope::Paths(_) if path == WILDCARD => *self = Scope::Any,
            Scope::Paths(paths) => {
                paths.insert(path);
            }
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        match self {
            Scope::Any => path == WILDCARD,
            Scope::Paths(paths) => paths.contains(path),
        }
    }

    pub fn paths(&self) -> Vec<&str> {
        match self {
            Scope::Any => vec![WILDCARD],
            Scope::Paths(paths) => paths.iter().map(String::as_str).collect(),
        }
    }

    /// How many times a change at `changed` signals this scope.
    ///
    /// An exact entry or the wildcard signal once. Otherwise every entry
    /// related to `changed` by a segment prefix, in either direction,
    /// signals once, so a single change may signal more than once.
    pub fn matches(&self, changed: &str) -> usize {
        match self {
            Scope::Any => 1,
            Scope::Paths(paths) if paths.contains(changed) => 1,
            Scope::Paths(paths) => paths
                .iter()
                .filter(|entry| is_prefix_str(entry, changed) || is_prefix_str(changed, entry))
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_scope_matches_nothing() {
        let scope = Scope::default();
        assert!(scope.is_unscoped());
        assert_eq!(scope.matches("a"), 0);
    }

    #[test]
    fn test_prefix_entry_matches_deeper_change() {
        let scope = Scope::from_paths(["items"]);
        assert_eq!(scope.matches("items[0].count"), 1);
        assert_eq!(scope.matches("itemsX"), 0);
    }

    #[test]
    fn test_sibling_entry_does_not_match() {
        let scope = Scope::from_paths(["items[0].count"]);
        assert_eq!(scope.matches("items[1].count"), 0);
        assert_eq!(scope.matches("items[10]"), 0);
    }

    #[test]
    fn test_restructured_ancestor_matches_deeper_entry() {
        let scope = Scope::from_paths(["a.b"]);
        assert_eq!(scope.matches("a"), 1);
    }

    #[test]
    fn test_multiple_related_entries_signal_each() {
        let scope = Scope::from_paths(["items", "items[0]", "other"]);
        assert_eq!(scope.matches("items[0].count"), 2);
        assert_eq!(scope.matches("items[0]"), 1);
    }

    #[test]
    fn test_wildcard() {
        let mut scope = Scope::from_paths(["a"]);
        scope.insert(WILDCARD.to_string());
        assert_eq!(scope, Scope::Any);
        assert_eq!(scope.matches("anything.at[3].all"), 1);
        assert!(!scope.is_unscoped());
    }
}
