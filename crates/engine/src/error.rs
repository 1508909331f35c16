//! Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Only [`ErrorKind::Authentication`] ever stops a worker. Everything else is
//! scoped to one file or one directory: logged, recorded, and then the walk
//! moves on.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Could not establish a session or list containers at worker startup.
    /// Fatal for that worker; never retried.
    #[display("authentication with storage failed")]
    Authentication,
    /// A storage operation failed after the session was established.
    #[display("storage operation failed")]
    Storage,
    /// The checkpoint of a directory could not be written.
    #[display("checkpoint write failed: {}", _0.display())]
    Checkpoint(#[error(not(source))] PathBuf),
    /// The change log of a directory could not be appended to.
    #[display("change log append failed: {}", _0.display())]
    ChangeLog(#[error(not(source))] PathBuf),
    /// Reading local files or directories failed.
    #[display("local I/O failed: {}", _0.display())]
    LocalIo(#[error(not(source))] PathBuf),
    /// The sync root itself could not be traversed.
    #[display("cannot walk {}", _0.display())]
    Walk(#[error(not(source))] PathBuf),
    /// The named container does not exist (or is not allowed).
    #[display("unknown container: {_0}")]
    UnknownContainer(#[error(not(source))] String),
}
