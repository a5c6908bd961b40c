//! Consumers and their work sessions.

use std::fmt;
use std::rc::Rc;

use deepstate_observer::{Datum, ListenerError};

use crate::scope::Scope;
use crate::store::Store;
use crate::throttle::ThrottledBatch;
use crate::StoreError;

/// Identity of one attached consumer, unique within its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(pub(crate) u64);

impl ConsumerId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Signal sent to a consumer whose scope matched a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub consumer: ConsumerId,
    /// The changed path that matched.
    pub path: String,
    /// Store-wide sequence number, increasing with every notification.
    pub seq: u64,
}

/// Called when a consumer should recompute.
pub type TriggerFn = Rc<dyn Fn(&Notification) -> Result<(), ListenerError>>;

/// An attached subscriber. Dropping it detaches it from the store.
#[derive(Debug)]
pub struct Consumer {
    store: Store,
    id: ConsumerId,
}

impl Consumer {
    pub(crate) fn new(store: Store, id: ConsumerId) -> Self {
        Self { store, id }
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    pub fn name(&self) -> Option<String> {
        self.store.consumer_name(self.id)
    }

    pub fn scope(&self) -> Scope {
        self.store.consumer_scope(self.id).unwrap_or_default()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Starts a unit of work. Tracked reads made until the returned session
    /// is dropped are added to this consumer's scope.
    pub fn begin(&self) -> Session<'_> {
        self.store.push_accessor(self.id);
        Session { consumer: self }
    }

    /// Replaces the scope with exactly `paths`. `"*"` watches everything.
    pub fn watch<I, S>(&self, paths: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.store.watch(self.id, paths)
    }

    /// Opens a pending batch for each top-level key.
    pub fn batch<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        self.store.open_batch(Some(self.id), &keys);
    }

    /// Closes the pending batches for `keys`, each becoming one undo step.
    pub fn batch_end<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        self.store.close_batch(Some(self.id), &keys);
    }

    pub fn throttled_batch<I, S>(&self, keys: I) -> ThrottledBatch
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ThrottledBatch::new(
            &self.store,
            self.id,
            keys.into_iter().map(Into::into).collect(),
        )
    }

    pub fn undo(&self) -> Result<bool, StoreError> {
        self.store.undo_as(Some(self.id))
    }

    pub fn redo(&self) -> Result<bool, StoreError> {
        self.store.redo_as(Some(self.id))
    }

    pub fn undo_count(&self) -> usize {
        self.store.undo_count()
    }

    pub fn redo_count(&self) -> usize {
        self.store.redo_count()
    }

    pub fn detach(self) {}
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.store.remove_consumer(self.id);
    }
}

/// A consumer's active unit of work.
#[derive(Debug)]
pub struct Session<'a> {
    consumer: &'a Consumer,
}

impl<'a> Session<'a> {
    pub fn consumer(&self) -> &'a Consumer {
        self.consumer
    }

    /// Tracked read, widening the consumer's scope.
    pub fn read(&self, path: &str) -> Result<Option<Datum>, StoreError> {
        self.consumer.store.read(path)
    }

    pub fn peek(&self, path: &str) -> Result<Option<Datum>, StoreError> {
        self.consumer.store.peek(path)
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.consumer.store.pop_accessor(self.consumer.id);
    }
}
