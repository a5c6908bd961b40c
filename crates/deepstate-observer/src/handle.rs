use deepstate_path::PathStep;

use crate::{Datum, NodeId, ObservableTree, ObserveError, Slot};

/// A cursor on one node of an [`ObservableTree`].
///
/// Navigation goes through tracked reads, so walking a handle down the tree
/// reports the same `Access` events as reading each step by hand.
#[derive(Debug)]
pub struct NodeHandle<'a> {
    tree: &'a mut ObservableTree,
    node: NodeId,
}

impl ObservableTree {
    pub fn handle(&mut self, node: NodeId) -> Result<NodeHandle<'_>, ObserveError> {
        if !self.contains(node) {
            return Err(ObserveError::Detached(node));
        }
        Ok(NodeHandle { tree: self, node })
    }

    pub fn root_handle(&mut self) -> NodeHandle<'_> {
        let node = self.root();
        NodeHandle { tree: self, node }
    }
}

impl<'a> NodeHandle<'a> {
    pub fn id(&self) -> NodeId {
        self.node
    }

    pub fn path(&self) -> Result<Vec<PathStep>, ObserveError> {
        self.tree.path_of(self.node)
    }

    fn descend(self, key: PathStep) -> Result<Self, ObserveError> {
        match self.tree.get(self.node, key.clone())? {
            Some(Slot::Node(node)) => Ok(NodeHandle {
                tree: self.tree,
                node,
            }),
            Some(Slot::Leaf(leaf)) => Err(ObserveError::NotComposite(leaf.type_name())),
            None => Err(ObserveError::NotFound(key.to_string())),
        }
    }

    pub fn at_key(self, key: impl Into<String>) -> Result<Self, ObserveError> {
        self.descend(PathStep::Key(key.into()))
    }

    pub fn at_index(self, index: usize) -> Result<Self, ObserveError> {
        self.descend(PathStep::Index(index))
    }

    /// Tracked read of one key, materialized as a plain value.
    pub fn read(&self, key: impl Into<PathStep>) -> Result<Option<Datum>, ObserveError> {
        Ok(self
            .tree
            .get(self.node, key)?
            .map(|slot| self.tree.snapshot_slot(&slot)))
    }

    pub fn set(&mut self, key: impl Into<PathStep>, value: impl Into<Datum>) -> Result<(), ObserveError> {
        self.tree.set(self.node, key, value)
    }

    pub fn delete(&mut self, key: impl Into<PathStep>) -> Result<Option<Datum>, ObserveError> {
        self.tree.delete(self.node, key)
    }

    pub fn push(&mut self, value: impl Into<Datum>) -> Result<usize, ObserveError> {
        self.tree.push(self.node, [value.into()])
    }

    pub fn pop(&mut self) -> Result<Option<Datum>, ObserveError> {
        self.tree.pop(self.node)
    }

    pub fn len(&self) -> Result<usize, ObserveError> {
        self.tree.len(self.node)
    }

    pub fn is_empty(&self) -> Result<bool, ObserveError> {
        self.tree.is_empty(self.node)
    }

    pub fn snapshot(&self) -> Result<Datum, ObserveError> {
        self.tree.snapshot(self.node)
    }
}
