//! Append-only record of upload attempts, one file per directory.
//!
//! Each line of `.swiftsync.log` is one event:
//!
//! ```text
//! timestamp,operation,objectName,success,detail
//! 1700000000.123456,upload,2023/a.jpg,true,
//! 1700000001.5,upload,2023/b.jpg,false,network error: connection reset
//! ```
//!
//! The file is never rewritten, truncated or rotated here.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

pub const CHANGE_LOG_FILE: &str = ".swiftsync.log";

/// One change log line.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub timestamp: f64,
    pub operation: &'static str,
    pub object_name: String,
    pub success: bool,
    pub detail: String,
}

impl Entry {
    pub fn upload(object_name: impl Into<String>, outcome: std::result::Result<(), String>) -> Self {
        let (success, detail) = match outcome {
            Ok(()) => (true, String::new()),
            Err(detail) => (false, detail),
        };
        Self { timestamp: crate::timestamp::now(), operation: "upload", object_name: object_name.into(), success, detail }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // One event per line, whatever the error message contained.
        let detail = self.detail.replace(['\n', '\r'], " ");
        write!(f, "{},{},{},{},{}", self.timestamp, self.operation, self.object_name, self.success, detail)
    }
}

/// Appender for the change log of one directory.
///
/// The file is only created by the first [`append`](Self::append), so
/// directories where nothing was ever attempted stay clean.
pub struct ChangeLog {
    path: PathBuf,
    file: Option<File>,
}

impl ChangeLog {
    pub fn new(directory: &Path) -> Self {
        Self { path: directory.join(CHANGE_LOG_FILE), file: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&mut self, entry: &Entry) -> Result<()> {
        let file = match self.file.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .or_raise(|| ErrorKind::ChangeLog(self.path.clone()))?,
        };
        let file = self.file.insert(file);
        let line = format!("{entry}\n");
        file.write_all(line.as_bytes()).await.or_raise(|| ErrorKind::ChangeLog(self.path.clone()))?;
        file.flush().await.or_raise(|| ErrorKind::ChangeLog(self.path.clone()))?;
        Ok(())
    }
}
