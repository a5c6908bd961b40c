//! The change event vocabulary shared by the tree, the registry and the store.

use std::fmt;

use deepstate_path::{format_path, Path, PathStep};

use crate::{Datum, NodeId};

/// What happened at a location in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Access,
    Insert,
    Update,
    Delete,
    /// The sequence was reordered by a sort.
    Shuffle,
    /// The sequence was reversed.
    Reverse,
}

impl ChangeKind {
    /// `Insert`, `Update` and `Delete` are the kinds that can be recorded in
    /// history and inverted.
    pub fn is_trackable(self) -> bool {
        matches!(self, ChangeKind::Insert | ChangeKind::Update | ChangeKind::Delete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Access => "access",
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
            ChangeKind::Shuffle => "shuffle",
            ChangeKind::Reverse => "reverse",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One read or mutation, with the path relative to the node that is
/// currently delivering it.
///
/// `value` is set for `Access`, `Insert` and `Update`; `old_value` for
/// `Update` and `Delete`. `Shuffle` and `Reverse` carry neither and have an
/// empty local path.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: Path,
    pub value: Option<Datum>,
    pub old_value: Option<Datum>,
    /// The node the event originated at.
    pub object: NodeId,
}

impl ChangeEvent {
    pub fn access(key: PathStep, value: Option<Datum>, object: NodeId) -> Self {
        Self {
            kind: ChangeKind::Access,
            path: vec![key],
            value,
            old_value: None,
            object,
        }
    }

    pub fn insert(key: PathStep, value: Datum, object: NodeId) -> Self {
        Self {
            kind: ChangeKind::Insert,
            path: vec![key],
            value: Some(value),
            old_value: None,
            object,
        }
    }

    pub fn update(key: PathStep, value: Datum, old_value: Datum, object: NodeId) -> Self {
        Self {
            kind: ChangeKind::Update,
            path: vec![key],
            value: Some(value),
            old_value: Some(old_value),
            object,
        }
    }

    pub fn delete(key: PathStep, old_value: Datum, object: NodeId) -> Self {
        Self {
            kind: ChangeKind::Delete,
            path: vec![key],
            value: None,
            old_value: Some(old_value),
            object,
        }
    }

    pub fn shuffle(object: NodeId) -> Self {
        Self {
            kind: ChangeKind::Shuffle,
            path: Vec::new(),
            value: None,
            old_value: None,
            object,
        }
    }

    pub fn reverse(object: NodeId) -> Self {
        Self {
            kind: ChangeKind::Reverse,
            path: Vec::new(),
            value: None,
            old_value: None,
            object,
        }
    }

    /// The key or index the event touched inside its originating node.
    pub fn key(&self) -> Option<&PathStep> {
        self.path.last()
    }

    /// Path of the originating node, relative to the delivering node.
    pub fn parent_path(&self) -> &[PathStep] {
        match self.kind {
            ChangeKind::Shuffle | ChangeKind::Reverse => &self.path,
            _ => &self.path[..self.path.len().saturating_sub(1)],
        }
    }

    pub fn path_string(&self) -> String {
        format_path(&self.path)
    }

    pub(crate) fn prepend(&mut self, step: PathStep) {
        self.path.insert(0, step);
    }
}
