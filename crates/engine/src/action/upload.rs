use crate::changelog::{ChangeLog, Entry};
use crate::checkpoint::Checkpoint;
use crate::error::Result;
use crate::files::{self, LocalFile};
use crate::location::Directory;
use crate::{content_type, timestamp};
use std::collections::BTreeSet;
use swiftsync_storage::{Body, StorageBackend};

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Upload files whose content type cannot be guessed (without a type)
    /// instead of skipping them.
    pub ignore_unknown_content_type: bool,
}

/// Counts for one directory scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: usize,
    pub skipped_unknown_type: usize,
    /// Files not modified since the previous scan.
    pub unchanged: usize,
}

/// Upload every file of `directory` modified since its last scan.
///
/// Individual failures never abort the scan: they are written to the change
/// log and the next file is tried. Once every file has been handled the
/// checkpoint moves to the instant the scan started, and the names of the
/// files that failed are stored with it so that the next pass attempts
/// them again (and only them, among the unmodified files).
///
/// Errors are returned only when the directory cannot be listed or its
/// checkpoint cannot be written.
pub async fn upload_directory(
    backend: &dyn StorageBackend,
    directory: &Directory,
    options: &UploadOptions,
) -> Result<UploadSummary> {
    let checkpoint = Checkpoint::load(&directory.path).await;
    let scan_start = timestamp::now();
    let files = files::list(&directory.path).await?;

    let mut summary = UploadSummary::default();
    let mut changelog = ChangeLog::new(&directory.path);
    let mut failed = BTreeSet::new();

    for file in files {
        if file.modified <= checkpoint.read_start() && !checkpoint.needs_retry(&file.name) {
            summary.unchanged += 1;
            continue;
        }
        let content_type = content_type::resolve(&file.name);
        if content_type.is_none() && !options.ignore_unknown_content_type {
            tracing::warn!(path = %file.path.display(), "Skipping file with unknown content type");
            summary.skipped_unknown_type += 1;
            continue;
        }
        let object_name = directory.object_name(&file.name);
        let outcome = upload_file(backend, &directory.container, &object_name, &file, content_type).await;
        match &outcome {
            Ok(()) => {
                tracing::info!(container = %directory.container, object = %object_name, "Uploaded");
                summary.uploaded += 1;
            },
            Err(detail) => {
                tracing::warn!(container = %directory.container, object = %object_name, error = %detail, "Upload failed");
                summary.failed += 1;
                failed.insert(file.name.clone());
            },
        }
        if let Err(err) = changelog.append(&Entry::upload(object_name, outcome)).await {
            tracing::warn!(error = ?err, "Could not record upload attempt");
        }
    }

    checkpoint.advanced_to(scan_start).retrying(failed).save(&directory.path).await?;
    Ok(summary)
}

/// Upload one file; the error is the message recorded in the change log.
async fn upload_file(
    backend: &dyn StorageBackend,
    container: &str,
    object_name: &str,
    file: &LocalFile,
    content_type: Option<&str>,
) -> std::result::Result<(), String> {
    let handle = tokio::fs::File::open(&file.path)
        .await
        .map_err(|err| format!("cannot open {}: {err}", file.path.display()))?;
    backend
        .upload(container, object_name, Body::from(handle), content_type)
        .await
        .map_err(|err| err.to_string())
}
