//! Traversal of the sync root for one worker's shard.

use crate::action::{AuditSummary, Outcome, SyncAction, UploadSummary};
use crate::error::{ErrorKind, Result};
use crate::location::{Directory, Unmappable};
use crate::partition::Shard;
use exn::ResultExt;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use swiftsync_storage::StorageBackend;
use tokio::fs;
use tokio_util::sync::CancellationToken;

/// Everything one worker needs to walk its shard.
pub struct Walker<'a> {
    pub root: &'a Path,
    pub shard: Shard,
    /// Containers that exist remotely (and are allowed). Directories of any
    /// other container are skipped.
    pub containers: &'a BTreeSet<String>,
    pub action: &'a SyncAction,
}

/// Counts for one pass over the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub processed: usize,
    pub foreign: usize,
    pub unknown_container: usize,
    pub failed: usize,
    /// Directories the action had nothing to do for.
    pub not_applicable: usize,
    pub uploads: UploadSummary,
    pub audit: AuditSummary,
    /// The pass stopped early because shutdown was requested.
    pub cancelled: bool,
}

impl PassSummary {
    fn record(&mut self, outcome: Outcome) {
        self.processed += 1;
        match outcome {
            Outcome::Uploaded(s) => {
                self.uploads.uploaded += s.uploaded;
                self.uploads.failed += s.failed;
                self.uploads.skipped_unknown_type += s.skipped_unknown_type;
                self.uploads.unchanged += s.unchanged;
            },
            Outcome::Audited(s) => {
                self.audit.matching += s.matching;
                self.audit.local_only += s.local_only;
                self.audit.remote_only += s.remote_only;
                self.audit.modified += s.modified;
                self.audit.unreadable += s.unreadable;
            },
            Outcome::NotApplicable => self.not_applicable += 1,
        }
    }
}

impl Walker<'_> {
    /// Visit every directory below the root, pre-order, and apply the action
    /// to those this shard owns.
    ///
    /// Files directly inside the root belong to no container and are never
    /// looked at. Symbolic links are not followed. Failures inside one
    /// directory are logged and counted; only an unreadable root fails the
    /// pass.
    pub async fn walk(&self, backend: &dyn StorageBackend, cancel: &CancellationToken) -> Result<PassSummary> {
        let mut summary = PassSummary::default();
        let mut pending = subdirectories(self.root).await.or_raise(|| ErrorKind::Walk(self.root.to_path_buf()))?;

        while let Some(path) = pending.pop() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            match Directory::locate(self.root, &path) {
                Ok(directory) => self.visit(backend, directory, &mut summary).await,
                Err(Unmappable::NonUtf8) => {
                    tracing::warn!(path = %path.display(), "Skipping directory with a name that is not valid UTF-8");
                    continue;
                },
                Err(Unmappable::OutsideRoot) => continue,
            }
            match subdirectories(&path).await {
                Ok(children) => pending.extend(children),
                Err(err) => tracing::warn!(path = %path.display(), error = ?err, "Cannot read directory"),
            }
        }
        Ok(summary)
    }

    async fn visit(&self, backend: &dyn StorageBackend, directory: Directory, summary: &mut PassSummary) {
        // Ownership first: a directory of an unknown container is then only
        // reported by the one worker that owns it.
        if !self.shard.owns(&directory.path) {
            tracing::debug!(path = %directory.path.display(), shard = self.shard.id(), "Owned by another worker");
            summary.foreign += 1;
            return;
        }
        if !self.containers.contains(&directory.container) {
            tracing::warn!(
                path = %directory.path.display(),
                container = %directory.container,
                "Skipping directory of unknown container"
            );
            summary.unknown_container += 1;
            return;
        }
        match self.action.apply(backend, &directory).await {
            Ok(outcome) => summary.record(outcome),
            Err(err) => {
                tracing::warn!(path = %directory.path.display(), action = self.action.name(), error = ?err, "Directory failed");
                summary.failed += 1;
            },
        }
    }
}

/// Real (non-symlink) subdirectories of `path`, in reverse name order so
/// that popping them off a stack visits them alphabetically.
async fn subdirectories(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(path).await?;
    let mut directories = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await;
        directories.extend(directory_entry(entry.path(), file_type));
    }
    directories.sort_unstable_by(|a, b| b.cmp(a));
    Ok(directories)
}

/// `path` if it is a directory. An entry that cannot be inspected is skipped
/// on its own, without losing its siblings.
fn directory_entry(path: PathBuf, file_type: std::io::Result<std::fs::FileType>) -> Option<PathBuf> {
    match file_type {
        Ok(file_type) => file_type.is_dir().then_some(path),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Cannot inspect directory entry; skipping");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Reporter, UploadOptions};
    use crate::partition::Partitioner;
    use rstest::rstest;
    use std::num::NonZeroUsize;
    use swiftsync_storage::backend::MockBackend;
    use tokio::sync::mpsc;

    fn tree(directories: &[&str]) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for directory in directories {
            let path = root.path().join(directory);
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(path.join("file.jpg"), directory.as_bytes()).unwrap();
        }
        root
    }

    fn containers(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn single_shard() -> Shard {
        Partitioner::new(NonZeroUsize::MIN).shard(0).unwrap()
    }

    #[tokio::test]
    async fn test_uploads_whole_tree() {
        let root = tree(&["photos", "photos/2023", "photos/2023/summer", "videos/clips"]);
        std::fs::write(root.path().join("stray.jpg"), b"root file").unwrap();
        let backend = MockBackend::with_containers(["photos", "videos"]);
        let action = SyncAction::Upload(UploadOptions::default());
        let known = containers(&["photos", "videos"]);
        let walker = Walker { root: root.path(), shard: single_shard(), containers: &known, action: &action };

        let summary = walker.walk(&backend, &CancellationToken::new()).await.unwrap();

        assert_eq!(summary.processed, 5);
        assert_eq!(summary.uploads.uploaded, 4);
        let mut names: Vec<String> = backend.uploads().into_iter().map(|u| format!("{}:{}", u.container, u.name)).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["photos:2023/file.jpg", "photos:2023/summer/file.jpg", "photos:file.jpg", "videos:clips/file.jpg"]
        );
    }

    #[tokio::test]
    async fn test_unknown_container_skipped() {
        let root = tree(&["photos/2023", "secret/2023"]);
        let backend = MockBackend::with_containers(["photos", "secret"]);
        let action = SyncAction::Upload(UploadOptions::default());
        let known = containers(&["photos"]);
        let walker = Walker { root: root.path(), shard: single_shard(), containers: &known, action: &action };

        let summary = walker.walk(&backend, &CancellationToken::new()).await.unwrap();

        assert_eq!(summary.unknown_container, 2);
        assert!(backend.uploads().iter().all(|upload| upload.container == "photos"));
        assert!(!root.path().join("secret/2023/.swiftsync.state").exists());
    }

    #[rstest]
    #[case(2)]
    #[case(3)]
    #[case(7)]
    #[tokio::test]
    async fn test_shards_cover_tree_exactly_once(#[case] workers: usize) {
        let directories = ["photos", "photos/a", "photos/b", "photos/a/1", "photos/a/2", "photos/c/3", "videos", "videos/x"];
        let root = tree(&directories);
        let backend = MockBackend::with_containers(["photos", "videos"]);
        let action = SyncAction::Upload(UploadOptions::default());
        let known = containers(&["photos", "videos"]);
        let partitioner = Partitioner::new(NonZeroUsize::new(workers).unwrap());

        let mut processed = 0;
        for shard in partitioner.all() {
            let walker = Walker { root: root.path(), shard, containers: &known, action: &action };
            let summary = walker.walk(&backend, &CancellationToken::new()).await.unwrap();
            processed += summary.processed;
        }

        // "photos/c" exists implicitly as the parent of "photos/c/3".
        assert_eq!(processed, directories.len() + 1);
        let mut uploaded: Vec<String> = backend.uploads().into_iter().map(|u| format!("{}:{}", u.container, u.name)).collect();
        let total = uploaded.len();
        uploaded.sort();
        uploaded.dedup();
        assert_eq!(uploaded.len(), total);
        assert_eq!(total, directories.len());
    }

    #[tokio::test]
    async fn test_audit_pass() {
        let root = tree(&["photos/2023"]);
        let backend = MockBackend::with_containers(["photos"]);
        let (reporter, mut receiver): (Reporter, _) = mpsc::unbounded_channel();
        let action = SyncAction::Audit(reporter);
        let known = containers(&["photos"]);
        let walker = Walker { root: root.path(), shard: single_shard(), containers: &known, action: &action };

        let summary = walker.walk(&backend, &CancellationToken::new()).await.unwrap();

        assert_eq!(summary.not_applicable, 1);
        assert_eq!(summary.audit.local_only, 1);
        assert_eq!(receiver.recv().await.unwrap().name(), "2023/file.jpg");
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let root = tree(&["photos/2023"]);
        let backend = MockBackend::with_containers(["photos"]);
        let action = SyncAction::Upload(UploadOptions::default());
        let known = containers(&["photos"]);
        let walker = Walker { root: root.path(), shard: single_shard(), containers: &known, action: &action };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = walker.walk(&backend, &cancel).await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.processed, 0);
        assert!(backend.uploads().is_empty());
    }

    #[test]
    fn test_uninspectable_entry_skipped_alone() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("photos")).unwrap();
        std::fs::write(root.path().join("file.jpg"), b"f").unwrap();
        let dir_type = std::fs::symlink_metadata(root.path().join("photos")).unwrap().file_type();
        let file_type = std::fs::symlink_metadata(root.path().join("file.jpg")).unwrap().file_type();

        let entries = [
            (root.path().join("photos"), Ok(dir_type)),
            (root.path().join("broken"), Err(std::io::Error::other("stat failed"))),
            (root.path().join("file.jpg"), Ok(file_type)),
        ];
        let kept: Vec<PathBuf> =
            entries.into_iter().filter_map(|(path, file_type)| directory_entry(path, file_type)).collect();

        assert_eq!(kept, vec![root.path().join("photos")]);
    }

    #[tokio::test]
    async fn test_missing_root_fails_pass() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("missing");
        let backend = MockBackend::with_containers(["photos"]);
        let action = SyncAction::Upload(UploadOptions::default());
        let known = containers(&["photos"]);
        let walker = Walker { root: &missing, shard: single_shard(), containers: &known, action: &action };
        let err = walker.walk(&backend, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Walk(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_directories_not_followed() {
        let root = tree(&["photos/2023"]);
        let elsewhere = tree(&["outside"]);
        std::os::unix::fs::symlink(elsewhere.path().join("outside"), root.path().join("photos/link")).unwrap();
        let backend = MockBackend::with_containers(["photos"]);
        let action = SyncAction::Upload(UploadOptions::default());
        let known = containers(&["photos"]);
        let walker = Walker { root: root.path(), shard: single_shard(), containers: &known, action: &action };

        let summary = walker.walk(&backend, &CancellationToken::new()).await.unwrap();

        assert_eq!(summary.processed, 2);
        assert!(backend.uploads().iter().all(|upload| !upload.name.starts_with("link")));
    }
}
