//! Storage target configuration.

use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which object store to sync into, and how to reach it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// A directory whose subdirectories act as containers.
    Local { root: PathBuf },
    /// An S3-compatible service; buckets act as containers.
    S3 {
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
        key_id: String,
        key_secret: String,
    },
}

impl StorageConfig {
    /// Short name used when logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::S3 { .. } => "s3",
        }
    }

    pub(crate) fn validate(&self, sync_root: &Path) -> Result<()> {
        match self {
            Self::Local { root } if !root.is_absolute() => {
                exn::bail!(ErrorKind::invalid("storage.root", "must be an absolute path"))
            },
            // Syncing a tree into itself would upload its own objects on the
            // next pass, forever.
            Self::Local { root } if root.starts_with(sync_root) || sync_root.starts_with(root) => {
                exn::bail!(ErrorKind::invalid("storage.root", "must not overlap with `root`"))
            },
            Self::S3 { region, .. } if region.is_empty() => {
                exn::bail!(ErrorKind::invalid("storage.region", "must not be empty"))
            },
            _ => Ok(()),
        }
    }
}

// Hand-written so that secrets never end up in logs.
impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { root } => f.debug_struct("Local").field("root", root).finish(),
            Self::S3 { region, endpoint, key_id, .. } => f
                .debug_struct("S3")
                .field("region", region)
                .field("endpoint", endpoint)
                .field("key_id", key_id)
                .field("key_secret", &"<redacted>")
                .finish(),
        }
    }
}
