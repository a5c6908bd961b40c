//! Classification of change batches delivered to the store's root observer.
//!
//! Reads widen the scope of the consumer on top of the accessor stack.
//! Writes are recorded in history (or in a pending batch), then mapped to
//! changed paths and matched against every consumer's scope. Matches are
//! queued and flushed by the store once the tree is no longer borrowed.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use deepstate_observer::{ChangeEvent, ChangeKind, ListenerError, ObserverFn};
use deepstate_path::top_level;

use crate::consumer::{ConsumerId, TriggerFn};
use crate::history::{History, HistoryEntry};
use crate::scope::Scope;
use crate::trace::{self, Category};

pub(crate) struct ConsumerRecord {
    pub name: Option<String>,
    pub scope: Scope,
    pub trigger: TriggerFn,
}

pub(crate) struct StoreState {
    pub name: String,
    pub consumers: IndexMap<ConsumerId, ConsumerRecord>,
    pub history: History,
    pub accessors: Vec<ConsumerId>,
    pub batches: IndexMap<String, Vec<ChangeEvent>>,
    pub bypass: bool,
    pub pending: Vec<(ConsumerId, String)>,
    next_consumer: u64,
    pub seq: u64,
}

/// Summary of an event for trace payloads.
pub(crate) fn describe(event: &ChangeEvent) -> String {
    match (&event.value, &event.old_value) {
        (Some(value), Some(old)) => {
            format!("{} {} {:?} -> {:?}", event.kind, event.path_string(), old, value)
        }
        (Some(value), None) => format!("{} {} {:?}", event.kind, event.path_string(), value),
        (None, Some(old)) => format!("{} {} (was {:?})", event.kind, event.path_string(), old),
        (None, None) => format!("{} {}", event.kind, event.path_string()),
    }
}

/// The path a change is reported under. Structural changes report the
/// top-level segment they happened under.
fn changed_path(event: &ChangeEvent) -> String {
    match event.kind {
        ChangeKind::Insert | ChangeKind::Delete => top_level(&event.path).unwrap_or_default(),
        _ => event.path_string(),
    }
}

impl StoreState {
    pub fn new(name: String) -> Self {
        Self {
            name,
            consumers: IndexMap::new(),
            history: History::default(),
            accessors: Vec::new(),
            batches: IndexMap::new(),
            bypass: false,
            pending: Vec::new(),
            next_consumer: 0,
            seq: 0,
        }
    }

    pub fn add_consumer(&mut self, name: Option<String>, trigger: TriggerFn) -> ConsumerId {
        self.next_consumer += 1;
        let id = ConsumerId(self.next_consumer);
        self.consumers.insert(
            id,
            ConsumerRecord {
                name,
                scope: Scope::default(),
                trigger,
            },
        );
        id
    }

    pub fn on_changes(&mut self, events: &[ChangeEvent]) {
        let mut changed: IndexSet<String> = IndexSet::new();
        let mut recorded = Vec::new();
        for event in events {
            if event.kind == ChangeKind::Access {
                self.bind(event);
                continue;
            }
            changed.insert(changed_path(event));
            trace::emit(&self.name, Category::Change, None, || describe(event));
            if !event.kind.is_trackable() || self.bypass {
                continue;
            }
            let key = top_level(&event.path).unwrap_or_default();
            match self.batches.get_mut(&key) {
                Some(batch) => {
                    batch.push(event.clone());
                    self.history.clear_redo();
                    let size = batch.len();
                    trace::emit(&self.name, Category::Batched, None, || {
                        format!("{key} ({size} changes)")
                    });
                }
                None => recorded.push(event.clone()),
            }
        }
        if let Some(entry) = HistoryEntry::from_events(recorded) {
            self.history.record(entry);
        }
        if !changed.is_empty() {
            self.fan_out(&changed);
        }
    }

    /// Attributes a read to the innermost active consumer.
    fn bind(&mut self, event: &ChangeEvent) {
        let Some(&id) = self.accessors.last() else {
            return;
        };
        let depth = self.accessors.len();
        let Some(record) = self.consumers.get_mut(&id) else {
            return;
        };
        let path = event.path_string();
        trace::emit(&self.name, Category::Bind, Some(id), || {
            format!("[{depth}] {} {path}", record.name.as_deref().unwrap_or("-"))
        });
        record.scope.insert(path);
    }

    fn fan_out(&mut self, changed: &IndexSet<String>) {
        trace::emit(&self.name, Category::Update, None, || {
            changed.iter().cloned().collect::<Vec<_>>().join(", ")
        });
        for (id, record) in &self.consumers {
            for path in changed {
                for _ in 0..record.scope.matches(path) {
                    self.pending.push((*id, path.clone()));
                }
            }
        }
    }

    /// Opens a pending batch for each key not already open.
    pub fn open_batch(&mut self, consumer: Option<ConsumerId>, keys: &[String]) {
        for key in keys {
            if !self.batches.contains_key(key) {
                trace::emit(&self.name, Category::Batch, consumer, || key.clone());
                self.batches.insert(key.clone(), Vec::new());
            }
        }
    }

    /// Closes each open batch, recording its events as one history entry.
    pub fn close_batch(&mut self, consumer: Option<ConsumerId>, keys: &[String]) {
        for key in keys {
            let Some(events) = self.batches.shift_remove(key) else {
                continue;
            };
            trace::emit(&self.name, Category::BatchEnd, consumer, || {
                format!("{key} ({} changes)", events.len())
            });
            if let Some(entry) = HistoryEntry::from_events(events) {
                self.history.push_undo(entry);
            }
        }
    }
}

/// Builds the root observer that feeds change batches into `state`.
pub(crate) fn root_observer(state: &Rc<RefCell<StoreState>>) -> ObserverFn {
    let state = Rc::clone(state);
    Rc::new(move |events: &[ChangeEvent]| {
        let mut state = state
            .try_borrow_mut()
            .map_err(|_| ListenerError::new("store state is already borrowed"))?;
        state.on_changes(events);
        Ok(())
    })
}

/// Suppresses history recording until dropped.
pub(crate) struct BypassGuard<'a> {
    state: &'a RefCell<StoreState>,
    previous: bool,
}

impl<'a> BypassGuard<'a> {
    /// Returns `None` if the state is currently borrowed.
    pub fn new(state: &'a RefCell<StoreState>) -> Option<Self> {
        let mut borrowed = state.try_borrow_mut().ok()?;
        let previous = std::mem::replace(&mut borrowed.bypass, true);
        drop(borrowed);
        Some(Self { state, previous })
    }
}

impl Drop for BypassGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.bypass = self.previous;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepstate_observer::observable;
    use deepstate_path::{parse_path, PathStep};
    use serde_json::json;

    fn state_with_consumer(paths: &[&str]) -> (StoreState, ConsumerId) {
        let mut state = StoreState::new("test".into());
        let trigger: TriggerFn = Rc::new(|_: &crate::Notification| Ok(()));
        let id = state.add_consumer(Some("c".into()), trigger);
        if let Some(record) = state.consumers.get_mut(&id) {
            record.scope = Scope::from_paths(paths.iter().copied());
        }
        (state, id)
    }

    fn update_at(path: &str) -> ChangeEvent {
        let tree = observable(json!({})).unwrap();
        let mut path = parse_path(path).unwrap();
        let key = path.pop().unwrap_or(PathStep::from(""));
        let mut event = ChangeEvent::update(key, 2.into(), 1.into(), tree.root());
        event.path = path.into_iter().chain(event.path).collect();
        event
    }

    #[test]
    fn test_changed_path_uses_top_level_for_structure() {
        let tree = observable(json!({})).unwrap();
        let mut insert = ChangeEvent::insert(PathStep::Index(3), 1.into(), tree.root());
        insert.path.insert(0, PathStep::from("items"));
        assert_eq!(changed_path(&insert), "items");
        assert_eq!(changed_path(&update_at("items[3].n")), "items[3].n");
    }

    #[test]
    fn test_updates_are_recorded_and_fanned_out() {
        let (mut state, id) = state_with_consumer(&["items"]);
        state.on_changes(&[update_at("items[0].count")]);
        assert_eq!(state.history.undo_count(), 1);
        assert_eq!(state.pending, vec![(id, "items[0].count".to_string())]);
    }

    #[test]
    fn test_bypass_suppresses_recording_only() {
        let (mut state, _) = state_with_consumer(&["*"]);
        state.bypass = true;
        state.on_changes(&[update_at("a")]);
        assert_eq!(state.history.undo_count(), 0);
        assert_eq!(state.pending.len(), 1);
    }

    #[test]
    fn test_batched_events_wait_for_close() {
        let (mut state, _) = state_with_consumer(&[]);
        state.open_batch(None, &["title".to_string()]);
        state.on_changes(&[update_at("title")]);
        state.on_changes(&[update_at("title")]);
        assert_eq!(state.history.undo_count(), 0);
        state.close_batch(None, &["title".to_string()]);
        assert_eq!(state.history.undo_count(), 1);
        state.close_batch(None, &["title".to_string()]);
        assert_eq!(state.history.undo_count(), 1);
    }

    #[test]
    fn test_read_binds_to_innermost_accessor() {
        let (mut state, outer) = state_with_consumer(&[]);
        let trigger: TriggerFn = Rc::new(|_: &crate::Notification| Ok(()));
        let inner = state.add_consumer(None, trigger);
        state.accessors.push(outer);
        state.accessors.push(inner);
        let tree = observable(json!({})).unwrap();
        state.on_changes(&[ChangeEvent::access(PathStep::from("a"), None, tree.root())]);
        assert!(state.consumers[&outer].scope.is_unscoped());
        assert!(state.consumers[&inner].scope.contains("a"));
        assert!(state.pending.is_empty());
    }
}
