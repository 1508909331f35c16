//! Object name validation.
//!
//! Object names are `/`-separated keys. Local paths are mapped onto them by
//! the sync engine, so a name that could not have come from a real directory
//! tree (empty segments, `.`/`..`, NUL bytes) is rejected before it reaches
//! a backend.

use crate::error::{ErrorKind, Result};

/// Validates an object name.
///
/// # Returns
/// Returns the name unchanged if valid, or [`InvalidName`](crate::error::ErrorKind::InvalidName)
/// if invalid.
///
/// # Examples
///
/// ```
/// use swiftsync_storage::validate_name;
/// // Valid names
/// assert!(validate_name("a.jpg").is_ok());
/// assert!(validate_name("2023/summer/a.jpg").is_ok());
/// // Invalid names
/// assert!(validate_name("").is_err());
/// assert!(validate_name("/a.jpg").is_err());
/// assert!(validate_name("2023//a.jpg").is_err());
/// assert!(validate_name("2023/../a.jpg").is_err());
/// assert!(validate_name("a\0b").is_err());
/// ```
pub fn validate(name: &str) -> Result<&str> {
    if name.is_empty() || name.contains('\0') {
        exn::bail!(ErrorKind::InvalidName(name.to_string()));
    }
    // Unlike filesystem paths, names are NOT normalized: "a//b" and "a/b" are
    // different objects to most stores, so anything ambiguous is an error.
    if name.split('/').any(|segment| matches!(segment, "" | "." | "..")) {
        exn::bail!(ErrorKind::InvalidName(name.to_string()));
    }
    Ok(name)
}
