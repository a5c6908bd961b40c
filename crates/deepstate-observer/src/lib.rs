//! Deep observation of nested values.
//!
//! An [`ObservableTree`] holds an object or array split into tracked nodes.
//! Reads and writes through the tree produce [`ChangeEvent`]s whose paths are
//! rebuilt from the nodes' parent links, and observers registered on any node
//! receive the events from that node and everything below it.
//!
//! ```
//! use std::rc::Rc;
//! use deepstate_observer::{observable, ChangeEvent, ObserveOptions, ObserverFn};
//! use serde_json::json;
//!
//! let mut tree = observable(json!({"items": [{"count": 1}]})).unwrap();
//! let callback: ObserverFn = Rc::new(|events: &[ChangeEvent]| {
//!     assert_eq!(events[0].path_string(), "items[0].count");
//!     Ok(())
//! });
//! tree.observe(tree.root(), callback, ObserveOptions::all()).unwrap();
//! let item = tree.node_at(&deepstate_path::parse_path("items[0]").unwrap()).unwrap();
//! tree.set(item, "count", 5).unwrap();
//! ```

mod arena;
pub mod datum;
pub mod error;
pub mod event;
mod handle;
pub mod registry;
mod sequence;
mod tree;

pub use arena::NodeId;
pub use datum::Datum;
pub use error::{ListenerError, ObserveError};
pub use event::{ChangeEvent, ChangeKind};
pub use handle::NodeHandle;
pub use registry::{call_isolated, ObserveOptions, ObserverFn, PathFilter};
pub use tree::{NodeKind, ObservableTree, Slot};

/// Values that can become an [`ObservableTree`].
pub trait IntoObservable {
    fn into_observable(self) -> Result<ObservableTree, ObserveError>;
}

impl IntoObservable for Datum {
    fn into_observable(self) -> Result<ObservableTree, ObserveError> {
        ObservableTree::new(self)
    }
}

impl IntoObservable for serde_json::Value {
    fn into_observable(self) -> Result<ObservableTree, ObserveError> {
        ObservableTree::new(Datum::from(self))
    }
}

impl IntoObservable for ObservableTree {
    /// A tree is already observable and is returned unchanged.
    fn into_observable(self) -> Result<ObservableTree, ObserveError> {
        Ok(self)
    }
}

/// Wraps a value into an observable tree.
///
/// Wrapping an existing tree returns it as-is.
pub fn observable(value: impl IntoObservable) -> Result<ObservableTree, ObserveError> {
    value.into_observable()
}
