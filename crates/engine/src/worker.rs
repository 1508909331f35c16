//! Worker lifecycle: connect, then walk the shard on schedule.

use crate::action::SyncAction;
use crate::daemon::{self, Schedule};
use crate::error::{ErrorKind, Result};
use crate::partition::{Partitioner, Shard};
use crate::walk::{PassSummary, Walker};
use exn::ResultExt;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use swiftsync_storage::{BackendHandle, Connector};
use tokio_util::sync::CancellationToken;

/// Configuration shared by all workers of one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub root: PathBuf,
    pub partitioner: Partitioner,
    /// Restrict syncing to these containers. [`None`] allows every container
    /// the storage account can see.
    pub allowlist: Option<BTreeSet<String>>,
    pub action: SyncAction,
    pub schedule: Schedule,
}

/// What one worker did before it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    pub passes: usize,
    /// Passes that could not walk the root at all.
    pub failed_passes: usize,
    pub last_pass: Option<PassSummary>,
}

/// Run one worker until its schedule ends or `cancel` fires.
///
/// The worker opens its own storage session and keeps it for its whole
/// life. Failing to connect or to list containers is an
/// [`Authentication`](ErrorKind::Authentication) error: the worker stops
/// without retrying. Nothing after that stops it.
pub async fn run_worker(
    connector: &dyn Connector,
    settings: &Settings,
    shard: Shard,
    cancel: &CancellationToken,
) -> Result<WorkerReport> {
    let worker = shard.id();
    let session = connector.connect().await.or_raise(|| ErrorKind::Authentication)?;
    let containers = known_containers(&session, settings.allowlist.as_ref()).await?;
    tracing::debug!(worker, backend = session.name(), containers = containers.len(), "Worker connected");

    let walker = Walker { root: &settings.root, shard, containers: &containers, action: &settings.action };
    let walker = &walker;
    let session = &session;
    // Only ever locked between awaits.
    let report = Mutex::new(WorkerReport { worker, passes: 0, failed_passes: 0, last_pass: None });
    let state = &report;
    let passes = daemon::run(settings.schedule, cancel, move |pass| async move {
        match walker.walk(session.as_ref(), cancel).await {
            Ok(summary) => {
                tracing::info!(
                    worker,
                    pass,
                    action = settings.action.name(),
                    processed = summary.processed,
                    failed = summary.failed,
                    unknown_container = summary.unknown_container,
                    uploaded = summary.uploads.uploaded,
                    upload_failures = summary.uploads.failed,
                    unknown_type = summary.uploads.skipped_unknown_type,
                    discrepancies = summary.audit.discrepancies(),
                    "Pass complete"
                );
                lock(state).last_pass = Some(summary);
            },
            Err(err) => {
                tracing::warn!(worker, pass, error = ?err, "Pass failed");
                lock(state).failed_passes += 1;
            },
        }
    })
    .await;
    let mut report = report.into_inner().unwrap_or_else(PoisonError::into_inner);
    report.passes = passes;
    Ok(report)
}

fn lock(report: &Mutex<WorkerReport>) -> MutexGuard<'_, WorkerReport> {
    report.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Containers that exist remotely, narrowed to the allowlist if there is one.
async fn known_containers(session: &BackendHandle, allowlist: Option<&BTreeSet<String>>) -> Result<BTreeSet<String>> {
    let remote = session.list_containers().await.or_raise(|| ErrorKind::Authentication)?;
    let Some(allowlist) = allowlist else {
        return Ok(remote);
    };
    for missing in allowlist.difference(&remote) {
        tracing::warn!(container = %missing, "Allowed container does not exist");
    }
    Ok(remote.intersection(allowlist).cloned().collect())
}

/// Spawn one task per shard and wait for all of them.
///
/// Reports are returned in worker order. A worker that failed to start does
/// not affect the others.
pub async fn run_all(
    connector: Arc<dyn Connector>,
    settings: Arc<Settings>,
    cancel: CancellationToken,
) -> Vec<Result<WorkerReport>> {
    let handles: Vec<_> = settings
        .partitioner
        .all()
        .map(|shard| {
            let connector = connector.clone();
            let settings = settings.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let result = run_worker(connector.as_ref(), &settings, shard, &cancel).await;
                if let Err(err) = &result {
                    tracing::error!(worker = shard.id(), error = ?err, "Worker stopped");
                }
                result
            })
        })
        .collect();
    // Release this copy so the audit reporter closes once the workers finish.
    drop(settings);

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(result) => reports.push(result),
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => tracing::error!(error = %err, "Worker task was cancelled"),
        }
    }
    reports
}
