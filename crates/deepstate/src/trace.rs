//! Process-wide trace sink.
//!
//! When enabled, the store reports what it does as `debug` events under the
//! `deepstate::trace` target. The sink is observational only: enabling or
//! disabling it never changes what the store returns.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ConsumerId;

static ENABLED: AtomicBool = AtomicBool::new(false);

pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Bind,
    Change,
    Batched,
    Update,
    Watch,
    Batch,
    BatchEnd,
    Push,
    Pop,
    Undo,
    Redo,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Bind => "bind",
            Category::Change => "change",
            Category::Batched => "batched",
            Category::Update => "update",
            Category::Watch => "watch",
            Category::Batch => "batch",
            Category::BatchEnd => "batchEnd",
            Category::Push => "push",
            Category::Pop => "pop",
            Category::Undo => "undo",
            Category::Redo => "redo",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emits one trace line. `payload` is only rendered when the sink is on.
pub(crate) fn emit<F>(store: &str, category: Category, consumer: Option<ConsumerId>, payload: F)
where
    F: FnOnce() -> String,
{
    if !is_enabled() {
        return;
    }
    let consumer = consumer.map(|id| id.to_string()).unwrap_or_default();
    tracing::debug!(
        target: "deepstate::trace",
        store,
        category = category.as_str(),
        consumer = %consumer,
        payload = %payload(),
    );
}
