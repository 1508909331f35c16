//! Deleting a list of objects from one container.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use swiftsync_storage::StorageBackend;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub deleted: usize,
    pub failed: usize,
}

/// Delete every object named in `names` (one per line) from `container`.
///
/// Trailing whitespace is stripped from each line and blank lines are
/// ignored. A failed deletion is logged and counted, then the next name is
/// tried. Fails early only if the container does not exist or `names`
/// cannot be read.
pub async fn delete_objects<R>(backend: &dyn StorageBackend, container: &str, names: R) -> Result<DeleteSummary>
where
    R: AsyncBufRead + Unpin,
{
    let containers = backend.list_containers().await.or_raise(|| ErrorKind::Storage)?;
    if !containers.contains(container) {
        exn::bail!(ErrorKind::UnknownContainer(container.to_string()));
    }

    let mut summary = DeleteSummary::default();
    let mut lines = names.lines();
    while let Some(line) = lines.next_line().await.or_raise(|| ErrorKind::LocalIo("<stdin>".into()))? {
        let name = line.trim_end();
        if name.is_empty() {
            continue;
        }
        match backend.delete(container, name).await {
            Ok(()) => {
                tracing::info!(container, object = name, "Deleted");
                summary.deleted += 1;
            },
            Err(err) => {
                tracing::warn!(container, object = name, error = ?err, "Delete failed");
                summary.failed += 1;
            },
        }
    }
    Ok(summary)
}
