use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// One-way sync of a directory tree into object storage.
#[derive(Debug, Parser)]
#[command(name = "swiftsync", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON). Defaults to the platform
    /// configuration directory.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// More logging (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload files changed since the previous pass.
    Upload {
        #[command(flatten)]
        sync: SyncArgs,
        /// Upload files whose content type cannot be guessed instead of
        /// skipping them.
        #[arg(short = 'c', long)]
        ignore_unknown_content_type: bool,
    },
    /// Report differences between local files and remote objects on stdout.
    Audit {
        #[command(flatten)]
        sync: SyncArgs,
    },
    /// Delete the objects named on stdin (one per line) from a container.
    Delete {
        #[arg(long, value_name = "NAME")]
        container: String,
    },
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Directory tree to sync; each directory directly inside is a container.
    #[arg(long, value_name = "PATH")]
    pub root: Option<PathBuf>,
    /// Number of workers. Keep it constant for a given root.
    #[arg(short, long)]
    pub workers: Option<usize>,
    /// Keep running, starting a pass every SECONDS.
    #[arg(short, long, value_name = "SECONDS")]
    pub interval: Option<u64>,
    /// Only sync into this container (repeatable).
    #[arg(long = "container", value_name = "NAME")]
    pub containers: Vec<String>,
}

/// Command-line values that override the configuration file.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    daemon_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    containers: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ignore_unknown_content_type: Option<bool>,
}

impl Command {
    pub fn overrides(&self) -> Overrides {
        match self {
            Self::Upload { sync, ignore_unknown_content_type } => Overrides {
                // A flag can only switch the option on.
                ignore_unknown_content_type: ignore_unknown_content_type.then_some(true),
                ..sync.overrides()
            },
            Self::Audit { sync } => sync.overrides(),
            Self::Delete { .. } => Overrides::default(),
        }
    }
}

impl SyncArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            root: self.root.clone(),
            workers: self.workers,
            daemon_interval: self.interval,
            containers: (!self.containers.is_empty()).then(|| self.containers.iter().cloned().collect()),
            ignore_unknown_content_type: None,
        }
    }
}
