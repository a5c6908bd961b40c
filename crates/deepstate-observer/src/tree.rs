//! The observation tree: a nested value split into tracked nodes.
//!
//! Each object or array in the value lives in its own [`Node`], stored in a
//! generational arena and addressed by [`NodeId`]. A node knows the key it
//! occupies in its parent and the parent's id, which is all that is needed
//! to rebuild paths: events start with the local key and get the parent's
//! own key prepended at every step on the way up to the root.

use indexmap::IndexMap;

use deepstate_path::{format_path, Path, PathStep};

use crate::arena::Arena;
use crate::registry::{self, ObserveOptions, ObserverFn, Registration};
use crate::{ChangeEvent, Datum, NodeId, ObserveError};

/// What a key of a node holds: a plain leaf or a nested node.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Leaf(Datum),
    Node(NodeId),
}

impl Slot {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Slot::Node(id) => Some(*id),
            Slot::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&Datum> {
        match self {
            Slot::Leaf(datum) => Some(datum),
            Slot::Node(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Object,
    Array,
}

#[derive(Debug)]
pub(crate) enum Target {
    Object(IndexMap<String, Slot>),
    Array(Vec<Slot>),
}

#[derive(Debug)]
pub(crate) struct Node {
    pub target: Target,
    pub own_key: Option<PathStep>,
    pub parent: Option<NodeId>,
    pub observers: Vec<Registration>,
}

impl Node {
    fn new(target: Target, own_key: Option<PathStep>, parent: Option<NodeId>) -> Self {
        Self {
            target,
            own_key,
            parent,
            observers: Vec::new(),
        }
    }
}

fn wrap(
    arena: &mut Arena<Node>,
    value: Datum,
    own_key: Option<PathStep>,
    parent: Option<NodeId>,
) -> Slot {
    match value {
        Datum::Array(items) => {
            let id = arena.insert(Node::new(Target::Array(Vec::new()), own_key, parent));
            let slots: Vec<Slot> = items
                .into_iter()
                .enumerate()
                .map(|(index, item)| wrap(arena, item, Some(PathStep::Index(index)), Some(id)))
                .collect();
            if let Some(node) = arena.get_mut(id) {
                node.target = Target::Array(slots);
            }
            Slot::Node(id)
        }
        Datum::Object(map) => {
            let id = arena.insert(Node::new(Target::Object(IndexMap::new()), own_key, parent));
            let slots: IndexMap<String, Slot> = map
                .into_iter()
                .map(|(key, item)| {
                    let slot = wrap(arena, item, Some(PathStep::Key(key.clone())), Some(id));
                    (key, slot)
                })
                .collect();
            if let Some(node) = arena.get_mut(id) {
                node.target = Target::Object(slots);
            }
            Slot::Node(id)
        }
        leaf => Slot::Leaf(leaf),
    }
}

/// A value tree whose reads and writes produce [`ChangeEvent`]s.
#[derive(Debug)]
pub struct ObservableTree {
    arena: Arena<Node>,
    root: NodeId,
}

impl ObservableTree {
    /// Wraps a composite value.
    ///
    /// # Errors
    ///
    /// [`ObserveError::NonObservable`] for binary, date and error leaves,
    /// [`ObserveError::NotComposite`] for any other scalar.
    pub fn new(value: impl Into<Datum>) -> Result<Self, ObserveError> {
        let value = value.into();
        if !value.is_composite() {
            let error = if value.is_opaque() {
                ObserveError::NonObservable(value.type_name())
            } else {
                ObserveError::NotComposite(value.type_name())
            };
            tracing::warn!(%error, "refusing to observe value");
            return Err(error);
        }
        let mut arena = Arena::new();
        match wrap(&mut arena, value, None, None) {
            Slot::Node(root) => Ok(Self { arena, root }),
            Slot::Leaf(leaf) => Err(ObserveError::NotComposite(leaf.type_name())),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns `true` while `node` is part of this tree.
    pub fn contains(&self, node: NodeId) -> bool {
        self.arena.contains(node)
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node, ObserveError> {
        self.arena.get(id).ok_or(ObserveError::Detached(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, ObserveError> {
        self.arena.get_mut(id).ok_or(ObserveError::Detached(id))
    }

    pub(crate) fn items(&self, id: NodeId) -> Result<&Vec<Slot>, ObserveError> {
        match &self.node(id)?.target {
            Target::Array(items) => Ok(items),
            Target::Object(_) => Err(ObserveError::NotArray(id)),
        }
    }

    pub(crate) fn items_mut(&mut self, id: NodeId) -> Result<&mut Vec<Slot>, ObserveError> {
        match &mut self.node_mut(id)?.target {
            Target::Array(items) => Ok(items),
            Target::Object(_) => Err(ObserveError::NotArray(id)),
        }
    }

    fn entries_mut(&mut self, id: NodeId) -> Result<&mut IndexMap<String, Slot>, ObserveError> {
        match &mut self.node_mut(id)?.target {
            Target::Object(entries) => Ok(entries),
            Target::Array(_) => Err(ObserveError::NotObject(id)),
        }
    }

    pub fn kind(&self, node: NodeId) -> Result<NodeKind, ObserveError> {
        Ok(match self.node(node)?.target {
            Target::Object(_) => NodeKind::Object,
            Target::Array(_) => NodeKind::Array,
        })
    }

    pub fn len(&self, node: NodeId) -> Result<usize, ObserveError> {
        Ok(match &self.node(node)?.target {
            Target::Object(entries) => entries.len(),
            Target::Array(items) => items.len(),
        })
    }

    pub fn is_empty(&self, node: NodeId) -> Result<bool, ObserveError> {
        Ok(self.len(node)? == 0)
    }

    /// The key `node` occupies in its parent, `None` for the root.
    pub fn own_key(&self, node: NodeId) -> Result<Option<&PathStep>, ObserveError> {
        Ok(self.node(node)?.own_key.as_ref())
    }

    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>, ObserveError> {
        Ok(self.node(node)?.parent)
    }

    /// Rebuilds the path from the root to `node` by walking parent links.
    pub fn path_of(&self, node: NodeId) -> Result<Path, ObserveError> {
        let mut path = Vec::new();
        let mut current = self.node(node)?;
        while let (Some(key), Some(parent)) = (&current.own_key, current.parent) {
            path.push(key.clone());
            current = self.node(parent)?;
        }
        path.reverse();
        Ok(path)
    }

    pub fn keys(&self, node: NodeId) -> Result<Vec<PathStep>, ObserveError> {
        Ok(match &self.node(node)?.target {
            Target::Object(entries) => entries.keys().cloned().map(PathStep::Key).collect(),
            Target::Array(items) => (0..items.len()).map(PathStep::Index).collect(),
        })
    }

    /// Brings a key into the form `node` stores it in: indices for arrays,
    /// string keys for objects.
    pub(crate) fn normalize_key(&self, node: NodeId, key: PathStep) -> Result<PathStep, ObserveError> {
        match self.node(node)?.target {
            Target::Object(_) => Ok(match key {
                PathStep::Key(key) => PathStep::Key(key),
                PathStep::Index(index) => PathStep::Key(index.to_string()),
            }),
            Target::Array(_) => key
                .as_index()
                .map(PathStep::Index)
                .ok_or_else(|| ObserveError::InvalidKey(key.to_string())),
        }
    }

    /// Reads a key without emitting an `Access` event.
    pub fn peek(&self, node: NodeId, key: &PathStep) -> Result<Option<&Slot>, ObserveError> {
        Ok(match &self.node(node)?.target {
            Target::Object(entries) => entries.get(&key.to_key()),
            Target::Array(items) => {
                let index = key
                    .as_index()
                    .ok_or_else(|| ObserveError::InvalidKey(key.to_string()))?;
                items.get(index)
            }
        })
    }

    /// Reads a key and reports the read as an `Access` event.
    ///
    /// The event is only built when an observer on `node` or one of its
    /// ancestors asked for reads.
    pub fn get(&self, node: NodeId, key: impl Into<PathStep>) -> Result<Option<Slot>, ObserveError> {
        let key = self.normalize_key(node, key.into())?;
        let slot = self.peek(node, &key)?.cloned();
        if self.reads_observed(node) {
            let value = slot.as_ref().map(|slot| self.snapshot_slot(slot));
            self.dispatch(node, vec![ChangeEvent::access(key, value, node)]);
        }
        Ok(slot)
    }

    /// Resolves a path from the root without emitting events.
    pub fn lookup(&self, path: &[PathStep]) -> Result<Option<Slot>, ObserveError> {
        let mut current = Slot::Node(self.root);
        for step in path {
            let Slot::Node(node) = current else {
                return Ok(None);
            };
            match self.peek(node, step)? {
                Some(slot) => current = slot.clone(),
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Resolves a path from the root, emitting one `Access` per step.
    pub fn read_path(&self, path: &[PathStep]) -> Result<Option<Slot>, ObserveError> {
        let mut current = Slot::Node(self.root);
        for step in path {
            let Slot::Node(node) = current else {
                return Ok(None);
            };
            match self.get(node, step.clone())? {
                Some(slot) => current = slot,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Resolves the node at `path` without emitting events.
    pub fn node_at(&self, path: &[PathStep]) -> Result<NodeId, ObserveError> {
        match self.lookup(path)? {
            Some(Slot::Node(id)) => Ok(id),
            Some(Slot::Leaf(leaf)) => Err(ObserveError::NotComposite(leaf.type_name())),
            None => Err(ObserveError::NotFound(format_path(path))),
        }
    }

    /// Copies the subtree under `node` out as a plain value.
    pub fn snapshot(&self, node: NodeId) -> Result<Datum, ObserveError> {
        Ok(match &self.node(node)?.target {
            Target::Object(entries) => Datum::Object(
                entries
                    .iter()
                    .map(|(key, slot)| (key.clone(), self.snapshot_slot(slot)))
                    .collect(),
            ),
            Target::Array(items) => {
                Datum::Array(items.iter().map(|slot| self.snapshot_slot(slot)).collect())
            }
        })
    }

    pub fn snapshot_slot(&self, slot: &Slot) -> Datum {
        match slot {
            Slot::Leaf(datum) => datum.clone(),
            Slot::Node(id) => self.snapshot(*id).unwrap_or(Datum::Null),
        }
    }

    /// The whole tree as a plain value.
    pub fn to_datum(&self) -> Datum {
        self.snapshot_slot(&Slot::Node(self.root))
    }

    /// Writes `value` under `key`.
    ///
    /// Writing a leaf equal to the current leaf does nothing. On an array,
    /// `index == len` appends and anything further is out of range.
    pub fn set(
        &mut self,
        node: NodeId,
        key: impl Into<PathStep>,
        value: impl Into<Datum>,
    ) -> Result<(), ObserveError> {
        let key = self.normalize_key(node, key.into())?;
        let value = value.into();
        if let Some(Slot::Leaf(current)) = self.peek(node, &key)? {
            if *current == value {
                return Ok(());
            }
        }
        match key {
            PathStep::Index(index) => {
                let len = self.items(node)?.len();
                if index > len {
                    return Err(ObserveError::IndexOutOfRange { index, len });
                }
                if index == len {
                    self.push(node, [value])?;
                    return Ok(());
                }
                let slot = self.adopt(value.clone(), PathStep::Index(index), node);
                let previous = std::mem::replace(&mut self.items_mut(node)?[index], slot);
                let old = self.release_slot(previous);
                self.dispatch(
                    node,
                    vec![ChangeEvent::update(PathStep::Index(index), value, old, node)],
                );
            }
            PathStep::Key(name) => {
                let slot = self.adopt(value.clone(), PathStep::Key(name.clone()), node);
                let previous = self.entries_mut(node)?.insert(name.clone(), slot);
                let event = match previous {
                    Some(previous) => {
                        let old = self.release_slot(previous);
                        ChangeEvent::update(PathStep::Key(name), value, old, node)
                    }
                    None => ChangeEvent::insert(PathStep::Key(name), value, node),
                };
                self.dispatch(node, vec![event]);
            }
        }
        Ok(())
    }

    /// Removes `key`, returning the detached value. An absent key is a no-op.
    ///
    /// On an array the following elements shift down.
    pub fn delete(
        &mut self,
        node: NodeId,
        key: impl Into<PathStep>,
    ) -> Result<Option<Datum>, ObserveError> {
        match self.normalize_key(node, key.into())? {
            PathStep::Index(index) => {
                if index >= self.items(node)?.len() {
                    return Ok(None);
                }
                Ok(self.splice_at(node, index, 1, Vec::new())?.pop())
            }
            PathStep::Key(name) => {
                let Some(previous) = self.entries_mut(node)?.shift_remove(&name) else {
                    return Ok(None);
                };
                let old = self.release_slot(previous);
                self.dispatch(
                    node,
                    vec![ChangeEvent::delete(PathStep::Key(name), old.clone(), node)],
                );
                Ok(Some(old))
            }
        }
    }

    /// Registers `callback` on `node`.
    ///
    /// # Errors
    ///
    /// [`ObserveError::DuplicateObserver`] if the same callback (by pointer)
    /// is already registered on `node`; the registration is left unchanged.
    pub fn observe(
        &mut self,
        node: NodeId,
        callback: ObserverFn,
        options: ObserveOptions,
    ) -> Result<(), ObserveError> {
        let entry = self.node_mut(node)?;
        if entry.observers.iter().any(|r| r.is(&callback)) {
            tracing::warn!(%node, "observer may be bound to a node only once");
            return Err(ObserveError::DuplicateObserver);
        }
        entry.observers.push(Registration::new(callback, options));
        Ok(())
    }

    /// Removes `callback` from `node`, or every observer when `None`.
    /// Returns how many registrations were removed.
    pub fn unobserve(
        &mut self,
        node: NodeId,
        callback: Option<&ObserverFn>,
    ) -> Result<usize, ObserveError> {
        let entry = self.node_mut(node)?;
        let before = entry.observers.len();
        match callback {
            Some(callback) => entry.observers.retain(|r| !r.is(callback)),
            None => entry.observers.clear(),
        }
        Ok(before - entry.observers.len())
    }

    /// Stores `value` as a child of `parent` under `key`, wrapping it when
    /// it is composite.
    pub(crate) fn adopt(&mut self, value: Datum, key: PathStep, parent: NodeId) -> Slot {
        wrap(&mut self.arena, value, Some(key), Some(parent))
    }

    /// Takes a slot out of the tree, freeing any nodes under it.
    pub(crate) fn release_slot(&mut self, slot: Slot) -> Datum {
        match slot {
            Slot::Leaf(datum) => datum,
            Slot::Node(id) => self.release(id),
        }
    }

    fn release(&mut self, id: NodeId) -> Datum {
        let Some(node) = self.arena.remove(id) else {
            return Datum::Null;
        };
        match node.target {
            Target::Object(entries) => Datum::Object(
                entries
                    .into_iter()
                    .map(|(key, slot)| (key, self.release_slot(slot)))
                    .collect(),
            ),
            Target::Array(items) => {
                Datum::Array(items.into_iter().map(|slot| self.release_slot(slot)).collect())
            }
        }
    }

    /// Re-stamps the own key of every nested node of an array after its
    /// elements moved.
    pub(crate) fn restamp(&mut self, node: NodeId) -> Result<(), ObserveError> {
        let children: Vec<(usize, NodeId)> = self
            .items(node)?
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_node().map(|id| (index, id)))
            .collect();
        for (index, child) in children {
            if let Some(entry) = self.arena.get_mut(child) {
                entry.own_key = Some(PathStep::Index(index));
            }
        }
        Ok(())
    }

    fn reads_observed(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(entry) = self.arena.get(id) else {
                return false;
            };
            if entry.observers.iter().any(|r| r.options.include_reads) {
                return true;
            }
            current = entry.parent;
        }
        false
    }

    /// Delivers events at `origin` and then at each ancestor, prepending the
    /// own key of the node being left at every step.
    pub(crate) fn dispatch(&self, origin: NodeId, mut events: Vec<ChangeEvent>) {
        let mut current = origin;
        while let Some(node) = self.arena.get(current) {
            registry::deliver(&node.observers, current, &events);
            let (Some(key), Some(parent)) = (&node.own_key, node.parent) else {
                return;
            };
            for event in &mut events {
                event.prepend(key.clone());
            }
            current = parent;
        }
    }
}
