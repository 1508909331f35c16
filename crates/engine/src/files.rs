//! Enumeration and hashing of the files directly inside one directory.

use crate::error::{ErrorKind, Result};
use crate::timestamp;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A regular, non-hidden file. Recomputed on every scan, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    pub name: String,
    pub path: PathBuf,
    /// Modification time in seconds since the Unix epoch.
    pub modified: f64,
}

impl LocalFile {
    /// Hex MD5 of the file content, streamed in fixed-size chunks.
    pub async fn hash(&self) -> Result<String> {
        let file = fs::File::open(&self.path).await.or_raise(|| ErrorKind::LocalIo(self.path.clone()))?;
        swiftsync_storage::md5_reader(file).await.or_raise(|| ErrorKind::LocalIo(self.path.clone()))
    }
}

/// List the files directly inside `directory`.
///
/// Subdirectories are not descended into (the walker reaches them on its
/// own). Hidden files, which include swiftsync's own checkpoint and change
/// log, are left out, as are names that are not valid UTF-8. Symbolic links
/// to regular files count as files.
///
/// The order of the result is unspecified.
pub async fn list(directory: &Path) -> Result<Vec<LocalFile>> {
    let mut entries = fs::read_dir(directory).await.or_raise(|| ErrorKind::LocalIo(directory.to_path_buf()))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.or_raise(|| ErrorKind::LocalIo(directory.to_path_buf()))? {
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(path = %path.display(), "Ignoring file with a name that is not valid UTF-8");
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            // Deleted since it was listed, or a dangling symlink.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e).or_raise(|| ErrorKind::LocalIo(path)),
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().or_raise(|| ErrorKind::LocalIo(path.clone()))?;
        files.push(LocalFile { name, path, modified: timestamp::from_system_time(modified) });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    #[tokio::test]
    async fn test_lists_regular_visible_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        std::fs::write(dir.path().join("b.xyz"), b"b").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"h").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/nested.jpg"), b"n").unwrap();

        let mut names: Vec<String> = list(dir.path()).await.unwrap().into_iter().map(|f| f.name).collect();
        names.sort();
        assert_eq!(names, vec!["a.jpg", "b.xyz"]);
    }

    #[tokio::test]
    async fn test_modified_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"a").unwrap();
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        std::fs::File::options().write(true).open(&path).unwrap().set_modified(at).unwrap();
        let files = list(dir.path()).await.unwrap();
        assert_eq!(files[0].modified, 1_600_000_000.0);
    }

    #[tokio::test]
    async fn test_hash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hello").unwrap();
        let files = list(dir.path()).await.unwrap();
        assert_eq!(files[0].hash().await.unwrap(), "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = list(&dir.path().join("gone")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::LocalIo(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.txt"), b"r").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("dangling.txt")).unwrap();
        let mut names: Vec<String> = list(dir.path()).await.unwrap().into_iter().map(|f| f.name).collect();
        names.sort();
        assert_eq!(names, vec!["link.txt", "real.txt"]);
    }
}
