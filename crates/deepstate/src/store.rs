//! The store: one observed tree, its consumers and its history.

use std::cell::RefCell;
use std::fmt;
use std::ops::RangeBounds;
use std::rc::{Rc, Weak};

use serde_json::Value;

use deepstate_observer::{
    call_isolated, observable, ChangeEvent, ChangeKind, Datum, ListenerError, NodeId, NodeKind,
    ObservableTree, ObserveError, ObserveOptions,
};
use deepstate_path::{format_path, parse_path, validate_path, validate_path_str, Path, PathError, PathStep};

use crate::consumer::{Consumer, ConsumerId, Notification, TriggerFn};
use crate::engine::{describe, root_observer, BypassGuard, StoreState};
use crate::scope::{Scope, WILDCARD};
use crate::throttle::{ManualScheduler, Scheduler};
use crate::trace::{self, Category};
use crate::{StoreError, StoreOptions};

pub(crate) struct StoreInner {
    name: String,
    options: StoreOptions,
    tree: RefCell<ObservableTree>,
    state: Rc<RefCell<StoreState>>,
    clock: Rc<ManualScheduler>,
    scheduler: RefCell<Rc<dyn Scheduler>>,
}

/// Handle to a store. Clones share the same store.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

/// Creates a store holding a copy of `initial`, which must be an object or
/// an array.
pub fn create_store(
    name: impl Into<String>,
    initial: impl Into<Datum>,
    options: StoreOptions,
) -> Result<Store, StoreError> {
    let name = name.into();
    if options.log {
        trace::set_enabled(true);
    }
    let mut tree = observable(initial.into())?;
    let state = Rc::new(RefCell::new(StoreState::new(name.clone())));
    tree.observe(tree.root(), root_observer(&state), ObserveOptions::all().with_reads())?;
    let clock = Rc::new(ManualScheduler::new());
    let scheduler: Rc<dyn Scheduler> = clock.clone();
    Ok(Store {
        inner: Rc::new(StoreInner {
            name,
            options,
            tree: RefCell::new(tree),
            state,
            clock,
            scheduler: RefCell::new(scheduler),
        }),
    })
}

fn parse(path: &str) -> Result<Path, StoreError> {
    validate_path_str(path)?;
    let steps = parse_path(path)?;
    validate_path(&steps)?;
    Ok(steps)
}

/// Splits a path into the path of its container and the final key.
fn split(path: &str) -> Result<(Path, PathStep), StoreError> {
    let mut steps = parse(path)?;
    let key = steps.pop().ok_or(PathError::NoParent)?;
    Ok((steps, key))
}

fn container(tree: &ObservableTree, path: &[PathStep]) -> Result<NodeId, StoreError> {
    tree.node_at(path).map_err(|error| match error {
        ObserveError::NotFound(path) => StoreError::NotFound(path),
        other => other.into(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

/// Puts `value` back under `key`: arrays get it inserted at the index.
fn put(tree: &mut ObservableTree, node: NodeId, key: PathStep, value: Datum) -> Result<(), ObserveError> {
    match tree.kind(node)? {
        NodeKind::Array => {
            let index = key
                .as_index()
                .ok_or_else(|| ObserveError::InvalidKey(key.to_string()))?;
            tree.insert(node, index, value)
        }
        NodeKind::Object => tree.set(node, key, value),
    }
}

/// Takes `key` out: arrays get the element removed with index shift.
fn take(tree: &mut ObservableTree, node: NodeId, key: PathStep) -> Result<(), ObserveError> {
    match tree.kind(node)? {
        NodeKind::Array => {
            let index = key
                .as_index()
                .ok_or_else(|| ObserveError::InvalidKey(key.to_string()))?;
            tree.remove(node, index).map(drop)
        }
        NodeKind::Object => tree.delete(node, key).map(drop),
    }
}

/// Applies one recorded event backwards (undo) or forwards (redo).
fn apply(tree: &mut ObservableTree, event: &ChangeEvent, direction: Direction) -> Result<(), StoreError> {
    let Some(key) = event.key().cloned() else {
        return Ok(());
    };
    let node = if tree.contains(event.object) {
        event.object
    } else {
        container(tree, event.parent_path())?
    };
    let value = |value: &Option<Datum>| value.clone().unwrap_or(Datum::Null);
    match (direction, event.kind) {
        (Direction::Undo, ChangeKind::Update) => tree.set(node, key, value(&event.old_value))?,
        (Direction::Redo, ChangeKind::Update) => tree.set(node, key, value(&event.value))?,
        (Direction::Undo, ChangeKind::Delete) => put(tree, node, key, value(&event.old_value))?,
        (Direction::Redo, ChangeKind::Insert) => put(tree, node, key, value(&event.value))?,
        (Direction::Undo, ChangeKind::Insert) | (Direction::Redo, ChangeKind::Delete) => {
            take(tree, node, key)?
        }
        _ => {}
    }
    Ok(())
}

impl Store {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    pub(crate) fn downgrade(&self) -> Weak<StoreInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<StoreInner>) -> Option<Store> {
        weak.upgrade().map(|inner| Store { inner })
    }

    /// The virtual clock a store schedules on until
    /// [`set_scheduler`](Store::set_scheduler) installs another scheduler.
    /// Advancing it fires throttled batches armed on it.
    pub fn manual_clock(&self) -> Rc<ManualScheduler> {
        Rc::clone(&self.inner.clock)
    }

    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        Rc::clone(&self.inner.scheduler.borrow())
    }

    /// Replaces the scheduler used by throttled batches armed from now on.
    pub fn set_scheduler(&self, scheduler: Rc<dyn Scheduler>) {
        *self.inner.scheduler.borrow_mut() = scheduler;
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> Option<R> {
        match self.inner.state.try_borrow_mut() {
            Ok(mut state) => Some(f(&mut state)),
            Err(_) => {
                tracing::warn!(store = %self.inner.name, "store state is busy");
                None
            }
        }
    }

    /// Attaches a consumer. `trigger` runs whenever a change matches the
    /// consumer's scope.
    pub fn attach<F>(&self, name: Option<&str>, trigger: F) -> Consumer
    where
        F: Fn(&Notification) -> Result<(), ListenerError> + 'static,
    {
        let trigger: TriggerFn = Rc::new(trigger);
        let name = name.map(str::to_owned);
        let mut state = self.inner.state.borrow_mut();
        let id = state.add_consumer(name.clone(), trigger);
        trace::emit(&state.name, Category::Push, Some(id), || {
            format!("attach {}", name.as_deref().unwrap_or("-"))
        });
        drop(state);
        Consumer::new(self.clone(), id)
    }

    pub fn consumer_count(&self) -> usize {
        self.inner
            .state
            .try_borrow()
            .map(|state| state.consumers.len())
            .unwrap_or(0)
    }

    pub(crate) fn consumer_name(&self, id: ConsumerId) -> Option<String> {
        let state = self.inner.state.try_borrow().ok()?;
        state.consumers.get(&id)?.name.clone()
    }

    pub(crate) fn consumer_scope(&self, id: ConsumerId) -> Option<Scope> {
        let state = self.inner.state.try_borrow().ok()?;
        state.consumers.get(&id).map(|record| record.scope.clone())
    }

    pub(crate) fn remove_consumer(&self, id: ConsumerId) {
        self.with_state(|state| {
            if state.consumers.shift_remove(&id).is_some() {
                trace::emit(&state.name, Category::Pop, Some(id), || "detach".to_string());
            }
        });
    }

    pub(crate) fn push_accessor(&self, id: ConsumerId) {
        self.with_state(|state| {
            state.accessors.push(id);
            let depth = state.accessors.len();
            trace::emit(&state.name, Category::Push, Some(id), || format!("session [{depth}]"));
        });
    }

    pub(crate) fn pop_accessor(&self, id: ConsumerId) {
        self.with_state(|state| {
            match state.accessors.iter().rposition(|active| *active == id) {
                Some(position) if position + 1 == state.accessors.len() => {
                    state.accessors.pop();
                }
                Some(position) => {
                    tracing::warn!(
                        store = %state.name,
                        consumer = %id,
                        "session ended while a nested session was still active"
                    );
                    state.accessors.remove(position);
                }
                None => return,
            }
            let scope = state
                .consumers
                .get(&id)
                .map(|record| record.scope.paths().join(", "))
                .unwrap_or_default();
            trace::emit(&state.name, Category::Pop, Some(id), || format!("session [{scope}]"));
        });
    }

    pub(crate) fn watch<I, S>(&self, id: ConsumerId, paths: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = Vec::new();
        for path in paths {
            let path = path.as_ref();
            if path == WILDCARD {
                entries.push(path.to_string());
            } else {
                entries.push(format_path(&parse(path)?));
            }
        }
        let scope = Scope::from_paths(entries);
        self.with_state(|state| {
            trace::emit(&state.name, Category::Watch, Some(id), || scope.paths().join(", "));
            if let Some(record) = state.consumers.get_mut(&id) {
                record.scope = scope;
            }
        })
        .ok_or(StoreError::Busy)
    }

    pub(crate) fn open_batch(&self, consumer: Option<ConsumerId>, keys: &[String]) {
        self.with_state(|state| state.open_batch(consumer, keys));
    }

    pub(crate) fn close_batch(&self, consumer: Option<ConsumerId>, keys: &[String]) {
        self.with_state(|state| state.close_batch(consumer, keys));
    }

    /// Opens pending batches without a consumer attribution.
    pub fn batch(&self, keys: &[&str]) {
        let keys: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
        self.open_batch(None, &keys);
    }

    pub fn batch_end(&self, keys: &[&str]) {
        let keys: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
        self.close_batch(None, &keys);
    }

    pub fn undo_count(&self) -> usize {
        self.inner
            .state
            .try_borrow()
            .map(|state| state.history.undo_count())
            .unwrap_or(0)
    }

    pub fn redo_count(&self) -> usize {
        self.inner
            .state
            .try_borrow()
            .map(|state| state.history.redo_count())
            .unwrap_or(0)
    }

    /// Tracked read: every step reached is added to the active consumer's
    /// scope.
    pub fn read(&self, path: &str) -> Result<Option<Datum>, StoreError> {
        let steps = parse(path)?;
        let tree = self.inner.tree.try_borrow().map_err(|_| StoreError::Busy)?;
        let slot = tree.read_path(&steps)?;
        Ok(slot.map(|slot| tree.snapshot_slot(&slot)))
    }

    /// Untracked read.
    pub fn peek(&self, path: &str) -> Result<Option<Datum>, StoreError> {
        let steps = parse(path)?;
        let tree = self.inner.tree.try_borrow().map_err(|_| StoreError::Busy)?;
        let slot = tree.lookup(&steps)?;
        Ok(slot.map(|slot| tree.snapshot_slot(&slot)))
    }

    pub fn snapshot(&self) -> Result<Datum, StoreError> {
        let tree = self.inner.tree.try_borrow().map_err(|_| StoreError::Busy)?;
        Ok(tree.to_datum())
    }

    pub fn to_value(&self) -> Result<Value, StoreError> {
        self.snapshot().map(Value::from)
    }

    /// Runs `f` on the tree, then delivers the notifications it caused.
    fn write<R>(
        &self,
        f: impl FnOnce(&mut ObservableTree) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let result = {
            let mut tree = self.inner.tree.try_borrow_mut().map_err(|_| StoreError::Busy)?;
            f(&mut tree)
        };
        self.flush();
        result
    }

    pub fn set(&self, path: &str, value: impl Into<Datum>) -> Result<(), StoreError> {
        let (parent, key) = split(path)?;
        let value = value.into();
        self.write(|tree| {
            let node = container(tree, &parent)?;
            Ok(tree.set(node, key, value)?)
        })
    }

    pub fn delete(&self, path: &str) -> Result<Option<Datum>, StoreError> {
        let (parent, key) = split(path)?;
        self.write(|tree| {
            let node = container(tree, &parent)?;
            Ok(tree.delete(node, key)?)
        })
    }

    pub fn push<I, D>(&self, path: &str, items: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = D>,
        D: Into<Datum>,
    {
        let steps = parse(path)?;
        let items: Vec<Datum> = items.into_iter().map(Into::into).collect();
        self.write(|tree| {
            let node = container(tree, &steps)?;
            Ok(tree.push(node, items)?)
        })
    }

    pub fn pop(&self, path: &str) -> Result<Option<Datum>, StoreError> {
        let steps = parse(path)?;
        self.write(|tree| {
            let node = container(tree, &steps)?;
            Ok(tree.pop(node)?)
        })
    }

    pub fn shift(&self, path: &str) -> Result<Option<Datum>, StoreError> {
        let steps = parse(path)?;
        self.write(|tree| {
            let node = container(tree, &steps)?;
            Ok(tree.shift(node)?)
        })
    }

    pub fn unshift<I, D>(&self, path: &str, items: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = D>,
        D: Into<Datum>,
    {
        let steps = parse(path)?;
        let items: Vec<Datum> = items.into_iter().map(Into::into).collect();
        self.write(|tree| {
            let node = container(tree, &steps)?;
            Ok(tree.unshift(node, items)?)
        })
    }

    pub fn splice(
        &self,
        path: &str,
        start: isize,
        delete_count: Option<usize>,
        items: Vec<Datum>,
    ) -> Result<Vec<Datum>, StoreError> {
        let steps = parse(path)?;
        self.write(|tree| {
            let node = container(tree, &steps)?;
            Ok(tree.splice(node, start, delete_count, items)?)
        })
    }

    pub fn fill(
        &self,
        path: &str,
        value: impl Into<Datum>,
        range: impl RangeBounds<usize>,
    ) -> Result<(), StoreError> {
        let steps = parse(path)?;
        let value = value.into();
        self.write(|tree| {
            let node = container(tree, &steps)?;
            Ok(tree.fill(node, value, range)?)
        })
    }

    pub fn sort<F>(&self, path: &str, compare: F) -> Result<(), StoreError>
    where
        F: FnMut(&Datum, &Datum) -> std::cmp::Ordering,
    {
        let steps = parse(path)?;
        self.write(|tree| {
            let node = container(tree, &steps)?;
            Ok(tree.sort(node, compare)?)
        })
    }

    pub fn reverse(&self, path: &str) -> Result<(), StoreError> {
        let steps = parse(path)?;
        self.write(|tree| {
            let node = container(tree, &steps)?;
            Ok(tree.reverse(node)?)
        })
    }

    /// Gives direct access to the tree. Changes made through it are
    /// recorded and notified like any other.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut ObservableTree) -> R) -> Result<R, StoreError> {
        self.write(|tree| Ok(f(tree)))
    }

    pub fn undo(&self) -> Result<bool, StoreError> {
        self.replay(None, Direction::Undo)
    }

    pub fn redo(&self) -> Result<bool, StoreError> {
        self.replay(None, Direction::Redo)
    }

    pub(crate) fn undo_as(&self, consumer: Option<ConsumerId>) -> Result<bool, StoreError> {
        self.replay(consumer, Direction::Undo)
    }

    pub(crate) fn redo_as(&self, consumer: Option<ConsumerId>) -> Result<bool, StoreError> {
        self.replay(consumer, Direction::Redo)
    }

    /// Pops one history entry and applies it with recording suppressed.
    /// Returns `false` when there is nothing to pop.
    fn replay(&self, consumer: Option<ConsumerId>, direction: Direction) -> Result<bool, StoreError> {
        let mut tree = self.inner.tree.try_borrow_mut().map_err(|_| StoreError::Busy)?;
        let guard = BypassGuard::new(&self.inner.state).ok_or(StoreError::Busy)?;
        let entry = self
            .with_state(|state| match direction {
                Direction::Undo => state.history.pop_undo(),
                Direction::Redo => state.history.pop_redo(),
            })
            .ok_or(StoreError::Busy)?;
        let Some(entry) = entry else {
            return Ok(false);
        };
        let mut events: Vec<&ChangeEvent> = entry.events().iter().collect();
        let category = match direction {
            Direction::Undo => {
                events.reverse();
                Category::Undo
            }
            Direction::Redo => Category::Redo,
        };
        for event in events {
            trace::emit(&self.inner.name, category, consumer, || describe(event));
            if let Err(error) = apply(&mut tree, event, direction) {
                tracing::warn!(
                    store = %self.inner.name,
                    %error,
                    change = %describe(event),
                    "could not replay change"
                );
            }
        }
        drop(guard);
        drop(tree);
        self.with_state(|state| match direction {
            Direction::Undo => state.history.push_redo(entry),
            Direction::Redo => state.history.push_undo(entry),
        });
        self.flush();
        Ok(true)
    }

    /// Delivers queued notifications, including any queued by the triggers
    /// themselves.
    fn flush(&self) {
        loop {
            let Some(pending) = self.with_state(|state| std::mem::take(&mut state.pending)) else {
                return;
            };
            if pending.is_empty() {
                return;
            }
            for (consumer, path) in pending {
                self.notify(consumer, path);
            }
        }
    }

    fn notify(&self, consumer: ConsumerId, path: String) {
        let found = self.with_state(|state| {
            let trigger = state
                .consumers
                .get(&consumer)
                .map(|record| Rc::clone(&record.trigger))?;
            state.seq += 1;
            Some((trigger, state.seq))
        });
        let Some((trigger, seq)) = found.flatten() else {
            tracing::warn!(
                store = %self.inner.name,
                %consumer,
                %path,
                "skipping notification for a consumer that is no longer attached"
            );
            return;
        };
        let notification = Notification {
            consumer,
            path,
            seq,
        };
        if let Err(error) = call_isolated(|| trigger(&notification)) {
            tracing::warn!(store = %self.inner.name, %consumer, %error, "consumer trigger failed");
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("options", &self.inner.options)
            .field("consumers", &self.consumer_count())
            .field("undo", &self.undo_count())
            .field("redo", &self.redo_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_rejects_scalars() {
        let error = create_store("s", json!(3), StoreOptions::default()).unwrap_err();
        assert_eq!(error, StoreError::Observe(ObserveError::NotComposite("number")));
        assert!(error.is_invalid_input());
    }

    #[test]
    fn test_set_and_read() {
        let store = create_store("s", json!({"a": {"b": 1}}), StoreOptions::default()).unwrap();
        store.set("a.b", 2).unwrap();
        assert_eq!(store.read("a.b").unwrap(), Some(Datum::from(2)));
        assert_eq!(store.peek("a.c").unwrap(), None);
        assert_eq!(store.to_value().unwrap(), json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_write_errors() {
        let store = create_store("s", json!({"a": 1}), StoreOptions::default()).unwrap();
        assert_eq!(store.set("", 1), Err(StoreError::Path(PathError::NoParent)));
        assert_eq!(store.set("x.y", 1), Err(StoreError::NotFound("x".into())));
        assert_eq!(
            store.push("a", [1]),
            Err(StoreError::Observe(ObserveError::NotComposite("number")))
        );
    }

    #[test]
    fn test_mutate_reentry_is_busy() {
        let store = create_store("s", json!({}), StoreOptions::default()).unwrap();
        let inner = store.clone();
        let nested = store.mutate(move |_| inner.set("a", 1)).unwrap();
        assert_eq!(nested, Err(StoreError::Busy));
    }

    #[test]
    fn test_undo_on_empty_history() {
        let store = create_store("s", json!({}), StoreOptions::default()).unwrap();
        assert!(!store.undo().unwrap());
        assert!(!store.redo().unwrap());
    }

    #[test]
    fn test_one_call_is_one_undo_step() {
        let store = create_store("s", json!({"list": [1, 2, 3, 4]}), StoreOptions::default()).unwrap();
        store
            .splice("list", 1, Some(2), vec![Datum::from(9)])
            .unwrap();
        assert_eq!(store.undo_count(), 1);
        store.undo().unwrap();
        assert_eq!(store.to_value().unwrap(), json!({"list": [1, 2, 3, 4]}));
        store.redo().unwrap();
        assert_eq!(store.to_value().unwrap(), json!({"list": [1, 9, 4]}));
    }
}
