//! Validation functions for state paths.

use crate::{PathError, PathStep};

/// Maximum allowed path string length in bytes.
pub const MAX_PATH_STRING_LENGTH: usize = 4096;

/// Maximum allowed path depth.
pub const MAX_PATH_LENGTH: usize = 256;

/// Validate a path string before parsing.
///
/// # Errors
///
/// Returns [`PathError::TooLong`] if the string exceeds
/// [`MAX_PATH_STRING_LENGTH`] bytes.
///
/// # Example
///
/// ```
/// use deepstate_path::validate_path_str;
///
/// validate_path_str("").unwrap();
/// validate_path_str("items[2].count").unwrap();
/// validate_path_str(&"a".repeat(5000)).unwrap_err();
/// ```
pub fn validate_path_str(path: &str) -> Result<(), PathError> {
    if path.len() > MAX_PATH_STRING_LENGTH {
        return Err(PathError::TooLong(path.len()));
    }
    Ok(())
}

/// Validate a path (array of path steps).
///
/// # Errors
///
/// Returns [`PathError::TooDeep`] if the path exceeds [`MAX_PATH_LENGTH`]
/// steps.
pub fn validate_path(path: &[PathStep]) -> Result<(), PathError> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(PathError::TooDeep(path.len()));
    }
    Ok(())
}
