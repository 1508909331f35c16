//! Sharded one-way synchronization of a directory tree to object storage.
//!
//! The sync root's first-level directories are containers; deeper levels
//! become pseudofolders. Work is split between `N` workers by hashing
//! directory paths ([`partition`]), so workers never coordinate. Each
//! directory keeps its own checkpoint and change log, which makes every
//! worker's state local to the directories it owns.

pub mod action;
pub mod bulk_delete;
pub mod changelog;
pub mod checkpoint;
pub mod content_type;
pub mod daemon;
pub mod error;
pub mod files;
pub mod location;
pub mod partition;
pub mod timestamp;
pub mod walk;
pub mod worker;

pub use crate::action::{Discrepancy, Reporter, SyncAction, UploadOptions};
pub use crate::daemon::Schedule;
pub use crate::partition::Partitioner;
pub use crate::worker::{Settings, WorkerReport, run_all};
