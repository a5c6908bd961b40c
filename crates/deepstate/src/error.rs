use thiserror::Error;

use deepstate_observer::ObserveError;
use deepstate_path::PathError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Observe(#[from] ObserveError),
    #[error("nothing at path '{0}'")]
    NotFound(String),
    #[error("store is busy with another operation")]
    Busy,
    #[error("invalid store options: {0}")]
    Options(String),
}

impl StoreError {
    /// Returns `true` for errors caused by the caller's input.
    pub fn is_invalid_input(&self) -> bool {
        match self {
            StoreError::Path(_) | StoreError::Options(_) => true,
            StoreError::Observe(error) => error.is_invalid_input(),
            StoreError::NotFound(_) | StoreError::Busy => false,
        }
    }
}
