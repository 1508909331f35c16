mod cli;
mod storage;

use crate::cli::{Cli, Command};
use clap::Parser;
use figment::providers::Serialized;
use std::num::NonZeroUsize;
use std::process::ExitCode;
use std::sync::Arc;
use swiftsync_config::Config;
use swiftsync_engine::action::AuditSummary;
use swiftsync_engine::{Discrepancy, Partitioner, Schedule, Settings, SyncAction, UploadOptions};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match swiftsync_config::figment(cli.config.as_deref())
        .and_then(|figment| Config::from_figment(figment.merge(Serialized::globals(cli.command.overrides()))))
    {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = ?err, "Invalid configuration");
            return ExitCode::FAILURE;
        },
    };
    tracing::debug!(?config, "Configuration loaded");

    let connector = match storage::connector(&config.storage) {
        Ok(connector) => connector,
        Err(err) => {
            tracing::error!(error = ?err, "Cannot set up storage");
            return ExitCode::FAILURE;
        },
    };

    match cli.command {
        Command::Delete { container } => delete(connector.as_ref(), &container).await,
        Command::Upload { .. } => {
            let options = UploadOptions { ignore_unknown_content_type: config.ignore_unknown_content_type };
            sync(connector, &config, SyncAction::Upload(options)).await
        },
        Command::Audit { .. } => {
            let (reporter, receiver) = mpsc::unbounded_channel();
            let printer = tokio::spawn(print_discrepancies(receiver));
            let code = sync(connector, &config, SyncAction::Audit(reporter)).await;
            // Every sender is gone once the workers have stopped.
            if let Err(err) = printer.await {
                tracing::error!(error = %err, "Audit output failed");
                return ExitCode::FAILURE;
            }
            code
        },
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Stdout carries audit results; logs go to stderr.
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn sync(connector: Arc<dyn swiftsync_storage::Connector>, config: &Config, action: SyncAction) -> ExitCode {
    // Validated to be at least 1.
    let workers = NonZeroUsize::new(config.workers).unwrap_or(NonZeroUsize::MIN);
    let settings = Settings {
        root: config.root.clone(),
        partitioner: Partitioner::new(workers),
        allowlist: config.containers.clone(),
        action,
        schedule: config.interval().map_or(Schedule::Once, Schedule::Every),
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; stopping after the current directory");
            on_signal.cancel();
        }
    });

    let reports = swiftsync_engine::run_all(connector, Arc::new(settings), cancel).await;
    let mut audit = AuditSummary::default();
    let mut code = ExitCode::SUCCESS;
    for report in &reports {
        match report {
            Ok(report) => {
                if let Some(pass) = report.last_pass {
                    audit.local_only += pass.audit.local_only;
                    audit.remote_only += pass.audit.remote_only;
                    audit.modified += pass.audit.modified;
                }
                if report.failed_passes > 0 {
                    code = ExitCode::FAILURE;
                }
            },
            Err(_) => code = ExitCode::FAILURE,
        }
    }
    if audit.discrepancies() > 0 {
        tracing::info!(
            local_only = audit.local_only,
            remote_only = audit.remote_only,
            modified = audit.modified,
            "Audit found discrepancies"
        );
    }
    code
}

async fn print_discrepancies(mut receiver: mpsc::UnboundedReceiver<Discrepancy>) {
    let mut stdout = tokio::io::stdout();
    while let Some(discrepancy) = receiver.recv().await {
        let line = format!("{discrepancy}\n");
        if let Err(err) = stdout.write_all(line.as_bytes()).await {
            tracing::error!(error = %err, "Cannot write to stdout");
            return;
        }
    }
    if let Err(err) = stdout.flush().await {
        tracing::error!(error = %err, "Cannot write to stdout");
    }
}

async fn delete(connector: &dyn swiftsync_storage::Connector, container: &str) -> ExitCode {
    let session = match connector.connect().await {
        Ok(session) => session,
        Err(err) => {
            tracing::error!(error = ?err, "Authentication with storage failed");
            return ExitCode::FAILURE;
        },
    };
    let stdin = BufReader::new(tokio::io::stdin());
    match swiftsync_engine::bulk_delete::delete_objects(session.as_ref(), container, stdin).await {
        Ok(summary) => {
            tracing::info!(deleted = summary.deleted, failed = summary.failed, "Delete complete");
            if summary.failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE }
        },
        Err(err) => {
            tracing::error!(error = ?err, "Delete failed");
            ExitCode::FAILURE
        },
    }
}
