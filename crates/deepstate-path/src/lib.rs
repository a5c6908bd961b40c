//! Dotted/bracketed state path utilities.
//!
//! A state path names one location in a nested value tree the way a host
//! language would spell a property chain: keys are joined with `.`, sequence
//! indices are written `[n]`.
//!
//! # Example
//!
//! ```
//! use deepstate_path::{format_path, parse_path, PathStep};
//!
//! let path = parse_path("items[2].count").unwrap();
//! assert_eq!(
//!     path,
//!     vec![PathStep::from("items"), PathStep::Index(2), PathStep::from("count")]
//! );
//! assert_eq!(format_path(&path), "items[2].count");
//! ```

use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

pub mod types;
pub use types::{Path, PathStep};

pub mod validate;
pub use validate::{validate_path, validate_path_str, MAX_PATH_LENGTH, MAX_PATH_STRING_LENGTH};

/// Characters that cannot appear in a bare (unquoted) key.
const RESERVED: [char; 4] = ['.', '[', ']', '"'];

/// Returns `true` when `key` must be written in the quoted `["..."]` form.
fn needs_quotes(key: &str) -> bool {
    key.is_empty() || key.contains(RESERVED)
}

/// Quotes a key for the bracketed form.
///
/// `\` and `"` are escaped with a backslash.
///
/// # Example
///
/// ```
/// use deepstate_path::quote_key;
///
/// assert_eq!(quote_key("a.b"), "[\"a.b\"]");
/// assert_eq!(quote_key("say \"hi\""), "[\"say \\\"hi\\\"\"]");
/// ```
pub fn quote_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    out.push_str("[\"");
    for ch in key.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push_str("\"]");
    out
}

/// Format path steps into a path string.
///
/// Returns an empty string for the root path (empty steps).
///
/// # Example
///
/// ```
/// use deepstate_path::{format_path, PathStep};
///
/// assert_eq!(format_path(&[]), "");
/// assert_eq!(format_path(&[PathStep::from("title")]), "title");
/// assert_eq!(format_path(&[PathStep::Index(0), PathStep::from("id")]), "[0].id");
/// ```
pub fn format_path(path: &[PathStep]) -> String {
    let mut out = String::new();
    for step in path {
        match step {
            PathStep::Index(index) => {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
            PathStep::Key(key) if needs_quotes(key) => out.push_str(&quote_key(key)),
            PathStep::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
        }
    }
    out
}

/// Parse a path string into path steps.
///
/// - The empty string is the root path
/// - A bare key may only start the path or follow a `.`
/// - `[n]` is an index, `["..."]` a quoted key
///
/// # Errors
///
/// Returns a [`PathError`] describing the first malformed position.
///
/// # Example
///
/// ```
/// use deepstate_path::{parse_path, PathStep};
///
/// assert_eq!(parse_path("").unwrap(), Vec::<PathStep>::new());
/// assert_eq!(parse_path("[1]").unwrap(), vec![PathStep::Index(1)]);
/// assert_eq!(parse_path("[\"a.b\"].c").unwrap(), vec![PathStep::from("a.b"), PathStep::from("c")]);
/// assert!(parse_path("a..b").is_err());
/// ```
pub fn parse_path(path: &str) -> Result<Path, PathError> {
    validate_path_str(path)?;
    let mut steps = Vec::new();
    let mut chars = path.char_indices().peekable();
    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            '[' => {
                chars.next();
                steps.push(parse_bracket(&mut chars, pos)?);
            }
            '.' if !steps.is_empty() => {
                chars.next();
                let key = take_bare_key(&mut chars);
                if key.is_empty() {
                    return Err(PathError::EmptyKey(pos + 1));
                }
                steps.push(PathStep::Key(key));
            }
            ch if RESERVED.contains(&ch) || !steps.is_empty() => {
                return Err(PathError::UnexpectedChar { pos, ch });
            }
            _ => steps.push(PathStep::Key(take_bare_key(&mut chars))),
        }
    }
    validate_path(&steps)?;
    Ok(steps)
}

fn take_bare_key(chars: &mut Peekable<CharIndices<'_>>) -> String {
    let mut key = String::new();
    while let Some(&(_, ch)) = chars.peek() {
        if RESERVED.contains(&ch) {
            break;
        }
        key.push(ch);
        chars.next();
    }
    key
}

/// Parses the remainder of a bracketed step; the `[` at `open` is consumed.
fn parse_bracket(chars: &mut Peekable<CharIndices<'_>>, open: usize) -> Result<PathStep, PathError> {
    if let Some(&(_, '"')) = chars.peek() {
        chars.next();
        let mut key = String::new();
        loop {
            match chars.next() {
                Some((_, '"')) => break,
                Some((pos, '\\')) => match chars.next() {
                    Some((_, ch @ ('"' | '\\'))) => key.push(ch),
                    Some((_, ch)) => return Err(PathError::UnexpectedChar { pos: pos + 1, ch }),
                    None => return Err(PathError::UnterminatedBracket(open)),
                },
                Some((_, ch)) => key.push(ch),
                None => return Err(PathError::UnterminatedBracket(open)),
            }
        }
        return match chars.next() {
            Some((_, ']')) => Ok(PathStep::Key(key)),
            Some((pos, ch)) => Err(PathError::UnexpectedChar { pos, ch }),
            None => Err(PathError::UnterminatedBracket(open)),
        };
    }

    let mut digits = String::new();
    loop {
        match chars.next() {
            Some((_, ']')) => break,
            Some((_, ch)) => digits.push(ch),
            None => return Err(PathError::UnterminatedBracket(open)),
        }
    }
    if !is_valid_index(&digits) {
        return Err(PathError::InvalidIndex(digits));
    }
    digits
        .parse()
        .map(PathStep::Index)
        .map_err(|_| PathError::InvalidIndex(digits))
}

/// Formats only the first step of `path`, or `None` for the root path.
///
/// The store groups history batches under this top-level segment.
///
/// # Example
///
/// ```
/// use deepstate_path::{parse_path, top_level};
///
/// assert_eq!(top_level(&parse_path("items[2].count").unwrap()).as_deref(), Some("items"));
/// assert_eq!(top_level(&[]), None);
/// ```
pub fn top_level(path: &[PathStep]) -> Option<String> {
    path.first().map(|step| format_path(std::slice::from_ref(step)))
}

/// Check if `parent` path strictly contains the `child` path.
///
/// # Example
///
/// ```
/// use deepstate_path::{is_child, PathStep};
///
/// let parent = vec![PathStep::from("items")];
/// let child = vec![PathStep::from("items"), PathStep::Index(0)];
/// assert!(is_child(&parent, &child));
/// assert!(!is_child(&child, &parent));
/// ```
pub fn is_child(parent: &[PathStep], child: &[PathStep]) -> bool {
    parent.len() < child.len() && is_prefix(parent, child)
}

/// Check if `prefix` is a step-wise prefix of `path` (or equal to it).
pub fn is_prefix(prefix: &[PathStep], path: &[PathStep]) -> bool {
    prefix.len() <= path.len() && prefix.iter().zip(path).all(|(a, b)| a == b)
}

/// Check if two paths are equal.
pub fn is_path_equal(p1: &[PathStep], p2: &[PathStep]) -> bool {
    p1 == p2
}

/// String form of [`is_prefix`] for already formatted paths.
///
/// The match must end on a segment boundary: `items` prefixes `items`,
/// `items[0]` and `items.size`, but not `itemsTotal`.
///
/// # Example
///
/// ```
/// use deepstate_path::is_prefix_str;
///
/// assert!(is_prefix_str("items", "items[0].count"));
/// assert!(is_prefix_str("items", "items"));
/// assert!(!is_prefix_str("items", "itemsTotal"));
/// assert!(!is_prefix_str("items[0].count", "items[1].count"));
/// ```
pub fn is_prefix_str(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    if !path.starts_with(prefix) {
        return false;
    }
    matches!(path.as_bytes().get(prefix.len()), None | Some(b'.') | Some(b'['))
}

/// Get the parent path of a given path.
///
/// # Errors
///
/// Returns [`PathError::NoParent`] for the root path.
pub fn parent(path: &[PathStep]) -> Result<Path, PathError> {
    match path.split_last() {
        Some((_, rest)) => Ok(rest.to_vec()),
        None => Err(PathError::NoParent),
    }
}

/// Check if a string represents a valid non-negative integer index.
///
/// # Example
///
/// ```
/// use deepstate_path::is_valid_index;
///
/// assert!(is_valid_index("0"));
/// assert!(is_valid_index("123"));
/// assert!(!is_valid_index("-1"));
/// assert!(!is_valid_index("01"));
/// assert!(!is_valid_index(""));
/// ```
pub fn is_valid_index(index: &str) -> bool {
    if index.is_empty() {
        return false;
    }
    let bytes = index.as_bytes();
    // First char can't be leading zero unless it's just "0"
    if bytes.len() > 1 && bytes[0] == b'0' {
        return false;
    }
    bytes.iter().all(|&b| b.is_ascii_digit())
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("unexpected '{ch}' at byte {pos}")]
    UnexpectedChar { pos: usize, ch: char },
    #[error("empty key at byte {0}")]
    EmptyKey(usize),
    #[error("bracket opened at byte {0} is never closed")]
    UnterminatedBracket(usize),
    #[error("invalid index '{0}'")]
    InvalidIndex(String),
    #[error("path string too long ({0} bytes)")]
    TooLong(usize),
    #[error("path too deep ({0} steps)")]
    TooDeep(usize),
    #[error("root path has no parent")]
    NoParent,
}
