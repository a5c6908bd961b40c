//! Undo and redo stacks.

use deepstate_observer::ChangeEvent;

/// One undoable action.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    Single(ChangeEvent),
    /// Events applied as one unit, in the order they happened.
    Batch(Vec<ChangeEvent>),
}

impl HistoryEntry {
    pub fn from_events(mut events: Vec<ChangeEvent>) -> Option<Self> {
        match events.len() {
            0 => None,
            1 => events.pop().map(HistoryEntry::Single),
            _ => Some(HistoryEntry::Batch(events)),
        }
    }

    pub fn events(&self) -> &[ChangeEvent] {
        match self {
            HistoryEntry::Single(event) => std::slice::from_ref(event),
            HistoryEntry::Batch(events) => events,
        }
    }
}

#[derive(Debug, Default)]
pub struct History {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
}

impl History {
    /// Records a new action. Anything that could be redone is dropped.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.undo.push(entry);
        self.redo.clear();
    }

    /// Pushes an entry without touching the redo stack.
    pub fn push_undo(&mut self, entry: HistoryEntry) {
        self.undo.push(entry);
    }

    pub fn push_redo(&mut self, entry: HistoryEntry) {
        self.redo.push(entry);
    }

    pub fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.undo.pop()
    }

    pub fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.redo.pop()
    }

    pub fn clear_redo(&mut self) {
        self.redo.clear();
    }

    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepstate_observer::{observable, ChangeEvent};
    use deepstate_path::PathStep;
    use serde_json::json;

    fn event(n: i64) -> ChangeEvent {
        let tree = observable(json!({})).unwrap();
        ChangeEvent::insert(PathStep::from("k"), n.into(), tree.root())
    }

    #[test]
    fn test_from_events() {
        assert_eq!(HistoryEntry::from_events(vec![]), None);
        assert!(matches!(
            HistoryEntry::from_events(vec![event(1)]),
            Some(HistoryEntry::Single(_))
        ));
        let batch = HistoryEntry::from_events(vec![event(1), event(2)]).unwrap();
        assert_eq!(batch.events().len(), 2);
    }

    #[test]
    fn test_record_clears_redo() {
        let mut history = History::default();
        history.record(HistoryEntry::Single(event(1)));
        let entry = history.pop_undo().unwrap();
        history.push_redo(entry);
        assert_eq!(history.redo_count(), 1);
        history.record(HistoryEntry::Single(event(2)));
        assert_eq!(history.redo_count(), 0);
        assert_eq!(history.undo_count(), 1);
    }
}
