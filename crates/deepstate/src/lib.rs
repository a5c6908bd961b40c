//! Reactive state store over an observed value tree.
//!
//! A [`Store`] wraps one object or array. Consumers attach with a trigger,
//! declare the paths they care about (explicitly with
//! [`Consumer::watch`], or implicitly by reading during a [`Session`]) and
//! get their trigger called when a matching path changes. Every write is
//! recorded so it can be undone and redone, and writes under a top-level key
//! can be grouped into one undo step with batches.
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use deepstate::{create_store, StoreOptions};
//! use serde_json::json;
//!
//! let store = create_store("todo", json!({"items": [{"count": 1}]}), StoreOptions::default()).unwrap();
//! let hits = Rc::new(Cell::new(0));
//! let seen = hits.clone();
//! let consumer = store.attach(Some("list"), move |_| {
//!     seen.set(seen.get() + 1);
//!     Ok(())
//! });
//! consumer.watch(["items"]).unwrap();
//!
//! store.set("items[0].count", 5).unwrap();
//! assert!(hits.get() >= 1);
//!
//! consumer.undo().unwrap();
//! assert_eq!(store.to_value().unwrap(), json!({"items": [{"count": 1}]}));
//! ```

mod consumer;
mod engine;
pub mod error;
pub mod history;
pub mod options;
pub mod scope;
mod store;
pub mod throttle;
pub mod trace;

pub use consumer::{Consumer, ConsumerId, Notification, Session, TriggerFn};
pub use error::StoreError;
pub use history::HistoryEntry;
pub use options::StoreOptions;
pub use scope::{Scope, WILDCARD};
pub use store::{create_store, Store};
pub use throttle::{ManualScheduler, Scheduler, ThrottledBatch, TimerId};

pub use deepstate_observer as observer;
pub use deepstate_observer::{ChangeEvent, ChangeKind, Datum, ListenerError};
pub use deepstate_path as path;
