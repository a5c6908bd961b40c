//! Observer registrations and isolated delivery.
//!
//! Every node keeps an ordered list of registrations. A change batch is
//! delivered to each registration as the subset of events its options
//! accept; a callback that fails, by returning an error or by panicking, is
//! logged and skipped so the remaining observers and ancestors still see the
//! batch.

use std::borrow::Cow;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;

use deepstate_path::{is_child, is_path_equal, is_prefix, Path, PathStep};

use crate::{ChangeEvent, ChangeKind, ListenerError, NodeId};

/// Callback invoked with the events a registration accepted.
pub type ObserverFn = Rc<dyn Fn(&[ChangeEvent]) -> Result<(), ListenerError>>;

/// Which event paths a registration is interested in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PathFilter {
    /// Every path.
    #[default]
    All,
    /// Exactly this path.
    Exact(Path),
    /// Paths one step below this path.
    ChildrenOf(Path),
    /// This path and everything below it.
    From(Path),
}

impl PathFilter {
    pub fn matches(&self, path: &[PathStep]) -> bool {
        match self {
            PathFilter::All => true,
            PathFilter::Exact(expected) => is_path_equal(expected, path),
            PathFilter::ChildrenOf(parent) => is_child(parent, path),
            PathFilter::From(prefix) => is_prefix(prefix, path),
        }
    }
}

/// Options for [`ObservableTree::observe`](crate::ObservableTree::observe).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    pub filter: PathFilter,
    /// Deliver `Access` events too. Off by default.
    pub include_reads: bool,
}

impl ObserveOptions {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn exact(path: Path) -> Self {
        Self {
            filter: PathFilter::Exact(path),
            include_reads: false,
        }
    }

    pub fn children_of(path: Path) -> Self {
        Self {
            filter: PathFilter::ChildrenOf(path),
            include_reads: false,
        }
    }

    pub fn under(path: Path) -> Self {
        Self {
            filter: PathFilter::From(path),
            include_reads: false,
        }
    }

    pub fn with_reads(mut self) -> Self {
        self.include_reads = true;
        self
    }

    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        if event.kind == ChangeKind::Access && !self.include_reads {
            return false;
        }
        self.filter.matches(&event.path)
    }
}

pub(crate) struct Registration {
    callback: ObserverFn,
    pub options: ObserveOptions,
}

impl Registration {
    pub fn new(callback: ObserverFn, options: ObserveOptions) -> Self {
        Self { callback, options }
    }

    /// Pointer identity of the callback.
    pub fn is(&self, callback: &ObserverFn) -> bool {
        Rc::as_ptr(&self.callback) as *const () == Rc::as_ptr(callback) as *const ()
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Runs a callback, turning a panic into a [`ListenerError`].
pub fn call_isolated<F>(callback: F) -> Result<(), ListenerError>
where
    F: FnOnce() -> Result<(), ListenerError>,
{
    match std::panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(result) => result,
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                format!("callback panicked: {s}")
            } else if let Some(s) = panic.downcast_ref::<String>() {
                format!("callback panicked: {s}")
            } else {
                "callback panicked".to_string()
            };
            Err(ListenerError(message))
        }
    }
}

pub(crate) fn deliver(registrations: &[Registration], node: NodeId, events: &[ChangeEvent]) {
    for registration in registrations {
        let accepted: Cow<'_, [ChangeEvent]> =
            if events.iter().all(|event| registration.options.accepts(event)) {
                Cow::Borrowed(events)
            } else {
                Cow::Owned(
                    events
                        .iter()
                        .filter(|event| registration.options.accepts(event))
                        .cloned()
                        .collect(),
                )
            };
        if accepted.is_empty() {
            continue;
        }
        let callback = &registration.callback;
        if let Err(error) = call_isolated(|| callback(accepted.as_ref())) {
            tracing::warn!(%node, %error, "failed to deliver changes to observer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn steps(keys: &[&str]) -> Path {
        keys.iter().map(|k| PathStep::from(*k)).collect()
    }

    fn event(kind_path: &[&str]) -> ChangeEvent {
        let mut event = ChangeEvent::insert(PathStep::from("x"), 1.into(), NodeId::new(0, 0));
        event.path = steps(kind_path);
        event
    }

    #[test]
    fn test_filters() {
        let path = steps(&["a", "b"]);
        assert!(PathFilter::All.matches(&path));
        assert!(PathFilter::Exact(steps(&["a", "b"])).matches(&path));
        assert!(!PathFilter::Exact(steps(&["a"])).matches(&path));
        assert!(PathFilter::ChildrenOf(steps(&["a"])).matches(&path));
        assert!(!PathFilter::ChildrenOf(steps(&[])).matches(&path));
        assert!(PathFilter::From(steps(&[])).matches(&path));
        assert!(PathFilter::From(steps(&["a"])).matches(&path));
        assert!(!PathFilter::From(steps(&["b"])).matches(&path));
    }

    #[test]
    fn test_reads_excluded_by_default() {
        let access = ChangeEvent::access(PathStep::from("a"), None, NodeId::new(0, 0));
        assert!(!ObserveOptions::all().accepts(&access));
        assert!(ObserveOptions::all().with_reads().accepts(&access));
    }

    #[test]
    fn test_failing_callback_does_not_stop_delivery() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let failing: ObserverFn = Rc::new(|_: &[ChangeEvent]| Err(ListenerError::new("nope")));
        let panicking: ObserverFn = Rc::new(|_: &[ChangeEvent]| -> Result<(), ListenerError> {
            panic!("deliberate")
        });
        let recording: ObserverFn = {
            let seen = seen.clone();
            Rc::new(move |events: &[ChangeEvent]| {
                seen.borrow_mut().push(events.len());
                Ok(())
            })
        };
        let registrations = vec![
            Registration::new(failing, ObserveOptions::all()),
            Registration::new(panicking, ObserveOptions::all()),
            Registration::new(recording, ObserveOptions::exact(steps(&["a"]))),
        ];
        deliver(
            &registrations,
            NodeId::new(0, 0),
            &[event(&["a"]), event(&["b"])],
        );
        assert_eq!(*seen.borrow(), vec![1]);
    }

    #[test]
    fn test_call_isolated_reports_panic_message() {
        let result = call_isolated(|| panic!("deliberate test panic"));
        let error = result.unwrap_err();
        assert!(error.0.contains("callback panicked"));
        assert!(error.0.contains("deliberate test panic"));
    }
}
