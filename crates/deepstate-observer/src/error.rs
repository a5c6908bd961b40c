use thiserror::Error;

use deepstate_path::PathError;

use crate::NodeId;

/// Errors raised by the observation tree and the observer registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObserveError {
    #[error("observable may only be created from an object or array, got {0}")]
    NotComposite(&'static str),
    #[error("{0} is a non-observable type")]
    NonObservable(&'static str),
    #[error("observer may be bound to a node only once")]
    DuplicateObserver,
    #[error("node {0} is detached from the tree")]
    Detached(NodeId),
    #[error("node {0} is not an array")]
    NotArray(NodeId),
    #[error("node {0} is not an object")]
    NotObject(NodeId),
    #[error("key {0} cannot address an array element")]
    InvalidKey(String),
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("nothing at path '{0}'")]
    NotFound(String),
    #[error(transparent)]
    Path(#[from] PathError),
}

impl ObserveError {
    /// Returns `true` for errors caused by the caller's input rather than by
    /// the state of the tree.
    pub fn is_invalid_input(&self) -> bool {
        !matches!(self, ObserveError::Detached(_) | ObserveError::NotFound(_))
    }
}

/// A failure reported by an observer or consumer callback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        ListenerError(message.into())
    }
}

impl From<&str> for ListenerError {
    fn from(message: &str) -> Self {
        ListenerError(message.to_owned())
    }
}

impl From<String> for ListenerError {
    fn from(message: String) -> Self {
        ListenerError(message)
    }
}
