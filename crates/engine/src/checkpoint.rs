//! Per-directory scan checkpoints.
//!
//! Each synced directory holds a small JSON record, `.swiftsync.state`,
//! remembering when the last completed scan of that directory *started*.
//! Files modified after that instant are the ones the next scan uploads,
//! together with the files whose upload failed last time (`retry`).
//!
//! A missing or unreadable checkpoint is never an error: it degrades to
//! "never scanned", and the directory is uploaded again in full. Re-uploading
//! unchanged content is harmless, losing track of a changed file is not.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const CHECKPOINT_FILE: &str = ".swiftsync.state";
const CHECKPOINT_TMP_FILE: &str = ".swiftsync.state.tmp";
const CURRENT_VERSION: u32 = 1;

fn current_version() -> u32 {
    CURRENT_VERSION
}

/// The persisted state of one directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default = "current_version")]
    version: u32,
    /// Start of the last completed scan, in seconds since the Unix epoch.
    #[serde(default)]
    readstart: f64,
    /// Files whose last upload attempt failed, by file name.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    retry: BTreeSet<String>,
    /// Keys written by newer releases; carried through untouched.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self { version: CURRENT_VERSION, readstart: 0.0, retry: BTreeSet::new(), extra: Map::new() }
    }
}

impl Checkpoint {
    /// Start of the last completed scan (0 if never scanned).
    pub fn read_start(&self) -> f64 {
        self.readstart
    }

    /// Must `file_name` be attempted again regardless of its mtime?
    pub fn needs_retry(&self, file_name: &str) -> bool {
        self.retry.contains(file_name)
    }

    /// The checkpoint to store after a scan that started at `read_start`.
    ///
    /// Any pending retries are cleared; see [`retrying`](Self::retrying).
    pub fn advanced_to(mut self, read_start: f64) -> Self {
        self.version = CURRENT_VERSION;
        self.readstart = read_start;
        self.retry.clear();
        self
    }

    /// Record the files whose upload failed during the scan.
    pub fn retrying(mut self, file_names: BTreeSet<String>) -> Self {
        self.retry = file_names;
        self
    }

    pub fn path(directory: &Path) -> PathBuf {
        directory.join(CHECKPOINT_FILE)
    }

    /// Read the checkpoint of `directory`, or the default if there is none or
    /// it cannot be understood.
    pub async fn load(directory: &Path) -> Self {
        let path = Self::path(directory);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable checkpoint; rescanning directory");
                return Self::default();
            },
        };
        match serde_json::from_slice::<Self>(&bytes) {
            Ok(checkpoint) if checkpoint.readstart.is_finite() && checkpoint.readstart >= 0.0 => checkpoint,
            Ok(_) => {
                tracing::warn!(path = %path.display(), "Checkpoint timestamp out of range; rescanning directory");
                Self::default()
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt checkpoint; rescanning directory");
                Self::default()
            },
        }
    }

    /// Replace the checkpoint of `directory`.
    ///
    /// Written to a temporary file and renamed into place, so a crash leaves
    /// either the old record, the new one, or (at worst) one that
    /// [`load`](Self::load) treats as missing.
    pub async fn save(&self, directory: &Path) -> Result<()> {
        let path = Self::path(directory);
        let tmp = directory.join(CHECKPOINT_TMP_FILE);
        let bytes = serde_json::to_vec(self).or_raise(|| ErrorKind::Checkpoint(path.clone()))?;
        fs::write(&tmp, bytes).await.or_raise(|| ErrorKind::Checkpoint(path.clone()))?;
        fs::rename(&tmp, &path).await.or_raise(|| ErrorKind::Checkpoint(path.clone()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn test_missing_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::load(dir.path()).await;
        assert_eq!(checkpoint, Checkpoint::default());
        assert_eq!(checkpoint.read_start(), 0.0);
    }

    #[rstest]
    #[case("")]
    #[case("{'readstart': 1700000000.5}")]
    #[case("{\"readstart\": \"yesterday\"}")]
    #[case("{\"readstart\": -5.0}")]
    #[case("[1, 2, 3]")]
    #[case("{\"readstart\": 1700000000.5")]
    #[tokio::test]
    async fn test_corrupt_is_default(#[case] contents: &str) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CHECKPOINT_FILE), contents).unwrap();
        assert_eq!(Checkpoint::load(dir.path()).await.read_start(), 0.0);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        Checkpoint::default().advanced_to(1_700_000_000.25).save(dir.path()).await.unwrap();
        assert_eq!(Checkpoint::load(dir.path()).await.read_start(), 1_700_000_000.25);
        assert!(!dir.path().join(CHECKPOINT_TMP_FILE).exists());
    }

    #[tokio::test]
    async fn test_format() {
        let dir = tempfile::tempdir().unwrap();
        Checkpoint::default().advanced_to(12.5).save(dir.path()).await.unwrap();
        let written: Value = serde_json::from_slice(&std::fs::read(dir.path().join(CHECKPOINT_FILE)).unwrap()).unwrap();
        assert_eq!(written["readstart"], 12.5);
        assert_eq!(written["version"], 1);
    }

    #[tokio::test]
    async fn test_unknown_keys_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CHECKPOINT_FILE), r#"{"readstart": 10.0, "owner": "shard-3", "version": 7}"#)
            .unwrap();
        let checkpoint = Checkpoint::load(dir.path()).await;
        assert_eq!(checkpoint.read_start(), 10.0);
        checkpoint.advanced_to(20.0).save(dir.path()).await.unwrap();
        let written: Value = serde_json::from_slice(&std::fs::read(dir.path().join(CHECKPOINT_FILE)).unwrap()).unwrap();
        assert_eq!(written["owner"], "shard-3");
        assert_eq!(written["readstart"], 20.0);
        assert_eq!(written["version"], 1);
    }

    #[tokio::test]
    async fn test_retry_list() {
        let dir = tempfile::tempdir().unwrap();
        let failed = BTreeSet::from(["bad.jpg".to_string()]);
        Checkpoint::default().advanced_to(30.0).retrying(failed).save(dir.path()).await.unwrap();

        let written: Value = serde_json::from_slice(&std::fs::read(dir.path().join(CHECKPOINT_FILE)).unwrap()).unwrap();
        assert_eq!(written["retry"], serde_json::json!(["bad.jpg"]));
        let checkpoint = Checkpoint::load(dir.path()).await;
        assert!(checkpoint.needs_retry("bad.jpg"));
        assert!(!checkpoint.needs_retry("good.jpg"));

        // A clean scan forgets the list and omits the key.
        checkpoint.advanced_to(40.0).save(dir.path()).await.unwrap();
        let written: Value = serde_json::from_slice(&std::fs::read(dir.path().join(CHECKPOINT_FILE)).unwrap()).unwrap();
        assert!(written.get("retry").is_none());
    }

    #[tokio::test]
    async fn test_save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Checkpoint::default().save(&dir.path().join("gone")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Checkpoint(_)));
    }
}
