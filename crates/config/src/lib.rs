//! Configuration loading and validation.
//!
//! Sources are layered with [`figment`], later sources overriding earlier
//! ones:
//!
//! 1. defaults (declared on [`Config`] via `serde(default)`),
//! 2. a configuration file (TOML, YAML or JSON, chosen by extension),
//! 3. `SWIFTSYNC_*` environment variables (nested keys split on `__`, e.g.
//!    `SWIFTSYNC_STORAGE__TYPE=local`),
//! 4. anything the caller merges on top (command-line flags).

pub mod error;
mod storage;

pub use crate::storage::StorageConfig;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SWIFTSYNC_";
const DEFAULT_FILE_NAME: &str = "config.toml";

fn default_workers() -> usize {
    1
}

/// Validated swiftsync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Local directory tree to synchronize. Each directory directly below it
    /// names a container.
    pub root: PathBuf,
    /// Number of concurrent workers the tree is partitioned across.
    ///
    /// Must stay the same for the lifetime of a deployment: changing it
    /// reassigns directories between workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Upload files whose content type cannot be guessed (without one)
    /// instead of skipping them.
    #[serde(default)]
    pub ignore_unknown_content_type: bool,
    /// Seconds between the starts of two passes. Absent: run a single pass.
    #[serde(default)]
    pub daemon_interval: Option<u64>,
    /// Only sync into these containers (intersected with the containers the
    /// storage service actually has). Absent: every remote container.
    #[serde(default)]
    pub containers: Option<BTreeSet<String>>,
    /// Where objects are stored.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the default layers.
    ///
    /// If `path` is [`None`], the platform configuration file (see
    /// [`default_path`]) is used when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(figment(path)?)
    }

    /// Extract and validate configuration from a prepared [`Figment`], for
    /// callers that merge extra layers (command-line flags) on top of
    /// [`figment()`].
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// The daemon interval, if running as a daemon.
    pub fn interval(&self) -> Option<Duration> {
        self.daemon_interval.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        if !self.root.is_absolute() {
            exn::bail!(ErrorKind::invalid("root", "must be an absolute path"));
        }
        if self.workers == 0 {
            exn::bail!(ErrorKind::invalid("workers", "must be at least 1"));
        }
        if self.daemon_interval == Some(0) {
            exn::bail!(ErrorKind::invalid("daemon_interval", "must be greater than zero"));
        }
        if let Some(containers) = &self.containers
            && let Some(bad) = containers.iter().find(|c| c.is_empty() || c.contains('/'))
        {
            exn::bail!(ErrorKind::invalid("containers", format!("not a container name: {bad:?}")));
        }
        self.storage.validate(&self.root)
    }
}

/// Platform configuration file location, e.g. `~/.config/swiftsync/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "swiftsync").map(|dirs| dirs.config_dir().join(DEFAULT_FILE_NAME))
}

/// The file and environment layers, without extraction.
pub fn figment(path: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::new();
    match path {
        Some(path) if !path.is_file() => exn::bail!(ErrorKind::MissingFile(path.to_path_buf())),
        Some(path) => figment = merge_file(figment, path),
        None => {
            if let Some(path) = default_path().filter(|p| p.is_file()) {
                tracing::debug!(path = %path.display(), "Using default configuration file");
                figment = merge_file(figment, &path);
            }
        },
    }
    Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}

fn merge_file(figment: Figment, path: &Path) -> Figment {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => figment.merge(Toml::file(path)),
    }
}
