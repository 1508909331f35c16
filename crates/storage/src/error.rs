//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Object (or container) does not exist
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Access denied for an individual operation
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// Credentials were rejected or the endpoint could not be reached while
    /// establishing a session. Don't retry with the same configuration.
    #[display("authentication failed: {_0}")]
    Authentication(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Network-related error (S3 connections, etc.)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Object name is empty, contains NUL bytes, or has empty/relative segments
    #[display("invalid object name: {_0:?}")]
    InvalidName(#[error(not(source))] String),
    /// The container does not exist on this backend
    #[display("unknown container: {_0}")]
    UnknownContainer(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}
