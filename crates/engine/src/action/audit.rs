use crate::error::{ErrorKind, Result};
use crate::files::{self, LocalFile};
use crate::location::Directory;
use exn::ResultExt;
use futures::TryStreamExt;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use swiftsync_storage::StorageBackend;
use tokio::sync::mpsc::UnboundedSender;

/// Where audit findings go. A single consumer prints them, so lines from
/// concurrent workers never interleave.
pub type Reporter = UnboundedSender<Discrepancy>;

/// One difference between a local directory and its pseudofolder.
///
/// The [`Display`](fmt::Display) form is the stable, machine-parseable audit
/// output:
///
/// ```text
/// + 2023/new.jpg <local hash>
/// - 2023/gone.jpg <remote hash>
/// ! 2023/edited.jpg <remote hash> <local hash>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    LocalOnly { name: String, local: String },
    RemoteOnly { name: String, remote: String },
    Modified { name: String, remote: String, local: String },
}

impl Discrepancy {
    pub fn name(&self) -> &str {
        match self {
            Self::LocalOnly { name, .. } | Self::RemoteOnly { name, .. } | Self::Modified { name, .. } => name,
        }
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalOnly { name, local } => write!(f, "+ {name} {local}"),
            Self::RemoteOnly { name, remote } => write!(f, "- {name} {remote}"),
            Self::Modified { name, remote, local } => write!(f, "! {name} {remote} {local}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditSummary {
    pub matching: usize,
    pub local_only: usize,
    pub remote_only: usize,
    pub modified: usize,
    /// Local files that could not be hashed and were not compared.
    pub unreadable: usize,
}

impl AuditSummary {
    pub fn discrepancies(&self) -> usize {
        self.local_only + self.remote_only + self.modified
    }
}

/// Compare the files of `directory` with the objects of its pseudofolder.
///
/// Container roots are not audited (returns [`None`]): without a prefix the
/// remote side would be the whole container. For every other directory each
/// difference is sent to `reporter`, local-only files first, then the rest,
/// each group ordered by object name.
pub async fn audit_directory(
    backend: &dyn StorageBackend,
    directory: &Directory,
    reporter: &Reporter,
) -> Result<Option<AuditSummary>> {
    let Some(pseudofolder) = directory.pseudofolder.as_deref() else {
        tracing::debug!(path = %directory.path.display(), "Container root; not audited");
        return Ok(None);
    };

    let remote: BTreeMap<String, String> = backend
        .list_stream(&directory.container, Some(pseudofolder))
        .map_ok(|object| (object.name, object.hash))
        .try_collect()
        .await
        .or_raise(|| ErrorKind::Storage)?;

    let (mut local, unreadable) = hash_files(directory, files::list(&directory.path).await?).await;

    let mut summary = AuditSummary { unreadable: unreadable.len(), ..AuditSummary::default() };
    let mut found = Vec::new();
    for (name, hash) in &local {
        if !remote.contains_key(name) {
            summary.local_only += 1;
            found.push(Discrepancy::LocalOnly { name: name.clone(), local: hash.clone() });
        }
    }
    for (name, remote_hash) in remote {
        if unreadable.contains(&name) {
            continue;
        }
        match local.remove(&name) {
            None => {
                summary.remote_only += 1;
                found.push(Discrepancy::RemoteOnly { name, remote: remote_hash });
            },
            Some(local_hash) if local_hash != remote_hash => {
                summary.modified += 1;
                found.push(Discrepancy::Modified { name, remote: remote_hash, local: local_hash });
            },
            Some(_) => summary.matching += 1,
        }
    }

    for discrepancy in found {
        if reporter.send(discrepancy).is_err() {
            tracing::warn!("Audit output closed; discarding remaining discrepancies");
            break;
        }
    }
    Ok(Some(summary))
}

/// Hash every file, keyed by object name. Files that cannot be read are
/// logged and returned separately so the caller can leave them out of the
/// comparison.
async fn hash_files(directory: &Directory, files: Vec<LocalFile>) -> (BTreeMap<String, String>, BTreeSet<String>) {
    let mut hashes = BTreeMap::new();
    let mut unreadable = BTreeSet::new();
    for file in files {
        let name = directory.object_name(&file.name);
        match file.hash().await {
            Ok(hash) => {
                hashes.insert(name, hash);
            },
            Err(err) => {
                tracing::warn!(path = %file.path.display(), error = ?err, "Cannot hash file; left out of audit");
                unreadable.insert(name);
            },
        }
    }
    (hashes, unreadable)
}
