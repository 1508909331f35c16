//! What to do with one directory once the walker has decided it is ours.

mod audit;
mod upload;

pub use self::audit::{AuditSummary, Discrepancy, Reporter, audit_directory};
pub use self::upload::{UploadOptions, UploadSummary, upload_directory};
use crate::error::Result;
use crate::location::Directory;
use swiftsync_storage::StorageBackend;

/// The per-directory logic a worker runs on every directory of its shard.
#[derive(Debug, Clone)]
pub enum SyncAction {
    /// Upload files changed since the directory's checkpoint.
    Upload(UploadOptions),
    /// Compare local files against remote objects and report differences.
    /// Read-only: never uploads, never touches a checkpoint.
    Audit(Reporter),
}

/// Result of applying a [`SyncAction`] to one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Uploaded(UploadSummary),
    Audited(AuditSummary),
    /// The action does not apply to this directory (audit of a container root).
    NotApplicable,
}

impl SyncAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Upload(_) => "upload",
            Self::Audit(_) => "audit",
        }
    }

    pub async fn apply(&self, backend: &dyn StorageBackend, directory: &Directory) -> Result<Outcome> {
        match self {
            Self::Upload(options) => upload_directory(backend, directory, options).await.map(Outcome::Uploaded),
            Self::Audit(reporter) => Ok(match audit_directory(backend, directory, reporter).await? {
                Some(summary) => Outcome::Audited(summary),
                None => Outcome::NotApplicable,
            }),
        }
    }
}
