//! Debounced batches and the scheduler they run on.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::consumer::ConsumerId;
use crate::store::{Store, StoreInner};

/// Handle for a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Runs tasks after a delay.
pub trait Scheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> TimerId;

    /// Cancels a task that has not run yet. Returns `false` if it already ran
    /// or was never scheduled.
    fn cancel(&self, timer: TimerId) -> bool;
}

struct Task {
    id: TimerId,
    due: Duration,
    run: Box<dyn FnOnce()>,
}

/// A scheduler driven by a virtual clock.
///
/// Nothing runs until [`advance`](ManualScheduler::advance) moves the clock
/// past a task's due time.
#[derive(Default)]
pub struct ManualScheduler {
    now: Cell<Duration>,
    next_id: Cell<u64>,
    tasks: RefCell<Vec<Task>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now.get()
    }

    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Moves the clock forward, running every task that falls due, earliest
    /// first. Tasks may schedule or cancel other tasks while running.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        loop {
            let next = {
                let mut tasks = self.tasks.borrow_mut();
                let due = tasks
                    .iter()
                    .enumerate()
                    .filter(|(_, task)| task.due <= target)
                    .min_by_key(|(_, task)| (task.due, task.id))
                    .map(|(index, _)| index);
                due.map(|index| tasks.remove(index))
            };
            let Some(task) = next else {
                break;
            };
            self.now.set(task.due.max(self.now.get()));
            (task.run)();
        }
        self.now.set(target);
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.tasks.borrow_mut().push(Task {
            id,
            due: self.now.get() + delay,
            run: task,
        });
        id
    }

    fn cancel(&self, timer: TimerId) -> bool {
        let mut tasks = self.tasks.borrow_mut();
        let before = tasks.len();
        tasks.retain(|task| task.id != timer);
        tasks.len() != before
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now.get())
            .field("pending", &self.pending())
            .finish()
    }
}

/// A timer armed on a particular scheduler.
struct Armed {
    scheduler: Rc<dyn Scheduler>,
    id: TimerId,
}

/// A batch that opens on [`trigger`](ThrottledBatch::trigger) and closes
/// once no trigger has happened for the store's throttle delay.
///
/// The timer is always cancelled on the scheduler it was armed on, so
/// swapping the store's scheduler between triggers keeps one debounce.
pub struct ThrottledBatch {
    store: Weak<StoreInner>,
    consumer: ConsumerId,
    keys: Rc<Vec<String>>,
    delay: Duration,
    armed: Rc<RefCell<Option<Armed>>>,
}

impl ThrottledBatch {
    pub(crate) fn new(store: &Store, consumer: ConsumerId, keys: Vec<String>) -> Self {
        Self {
            store: store.downgrade(),
            consumer,
            keys: Rc::new(keys),
            delay: store.options().throttle_delay(),
            armed: Rc::new(RefCell::new(None)),
        }
    }

    /// Opens the batch and (re)arms the timer that closes it.
    pub fn trigger(&self) {
        let Some(store) = Store::upgrade(&self.store) else {
            return;
        };
        store.open_batch(Some(self.consumer), &self.keys);
        self.disarm();
        let scheduler = store.scheduler();
        let weak = self.store.clone();
        let keys = Rc::clone(&self.keys);
        let consumer = self.consumer;
        let armed = Rc::clone(&self.armed);
        let id = scheduler.schedule(
            self.delay,
            Box::new(move || {
                armed.borrow_mut().take();
                if let Some(store) = Store::upgrade(&weak) {
                    store.close_batch(Some(consumer), &keys);
                }
            }),
        );
        *self.armed.borrow_mut() = Some(Armed { scheduler, id });
    }

    /// Disarms the timer, leaving the batch open.
    pub fn cancel(&self) -> bool {
        self.disarm()
    }

    fn disarm(&self) -> bool {
        let Some(armed) = self.armed.borrow_mut().take() else {
            return false;
        };
        armed.scheduler.cancel(armed.id)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.borrow().is_some()
    }
}

impl fmt::Debug for ThrottledBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottledBatch")
            .field("consumer", &self.consumer)
            .field("keys", &self.keys)
            .field("delay", &self.delay)
            .field("timer", &self.armed.borrow().as_ref().map(|armed| armed.id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_run_in_due_order() {
        let clock = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (name, delay) in [("late", 30), ("early", 10), ("middle", 20)] {
            let log = log.clone();
            clock.schedule(
                Duration::from_millis(delay),
                Box::new(move || log.borrow_mut().push(name)),
            );
        }
        clock.advance(Duration::from_millis(20));
        assert_eq!(*log.borrow(), vec!["early", "middle"]);
        assert_eq!(clock.pending(), 1);
        clock.advance(Duration::from_millis(10));
        assert_eq!(*log.borrow(), vec!["early", "middle", "late"]);
        assert_eq!(clock.now(), Duration::from_millis(30));
    }

    #[test]
    fn test_cancel() {
        let clock = ManualScheduler::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let id = clock.schedule(Duration::from_millis(5), Box::new(move || flag.set(true)));
        assert!(clock.cancel(id));
        assert!(!clock.cancel(id));
        clock.advance(Duration::from_secs(1));
        assert!(!ran.get());
    }
}
