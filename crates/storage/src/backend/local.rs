//! Local filesystem storage backend.
//!
//! This module provides a storage backend implementation for the local
//! filesystem: every directory directly under the configured root is a
//! container, and every file below a container is an object whose name is its
//! `/`-joined path relative to that container. Useful as a sync target on a
//! mounted volume, and for exercising the engine end-to-end without a network.

use crate::backend::{Body, Connector, ObjectInfoStream, is_direct_child};
use crate::error::{ErrorKind, Result};
use crate::{BackendHandle, ObjectInfo, StorageBackend, md5_reader, validate_name};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Marks in-flight uploads; hidden entries are never listed.
const PARTIAL_SUFFIX: &str = ".swiftsync-partial";

/// Local filesystem storage backend.
///
/// # Examples
///
/// ```no_run
/// use swiftsync_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("mirror", "/mnt/mirror")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalBackend {
    name: String,
    /// Directory whose subdirectories are the containers
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Errors
    ///
    /// Returns [`Authentication`](ErrorKind::Authentication) if the root is
    /// not an absolute path to an existing directory: the local equivalent
    /// of an unreachable endpoint.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() || !root.is_dir() {
            exn::bail!(ErrorKind::Authentication(format!("not an absolute directory: {}", root.display())));
        }
        Ok(Self { name: name.into(), root })
    }

    /// Absolute path of a container directory, which must already exist.
    async fn container_path(&self, container: &str) -> Result<PathBuf> {
        let path = validate_name(container)
            .ok()
            .filter(|c| !c.contains('/') && !c.starts_with('.'))
            .map(|c| self.root.join(c))
            .ok_or_else(|| exn::Exn::from(ErrorKind::InvalidName(container.to_string())))?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            Ok(_) => exn::bail!(ErrorKind::UnknownContainer(container.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                exn::bail!(ErrorKind::UnknownContainer(container.to_string()))
            },
            Err(e) => Err(Self::map_io_error(e, container).into()),
        }
    }

    /// Absolute path of an object, after validating its name.
    async fn object_path(&self, container: &str, name: &str) -> Result<PathBuf> {
        let name = validate_name(name)?;
        Ok(name.split('/').fold(self.container_path(container).await?, |path, segment| path.join(segment)))
    }

    fn map_io_error(e: std::io::Error, name: &str) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(name.to_string()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(name.to_string()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Hash one directory entry if it is a listable object.
    async fn process_entry(entry: fs::DirEntry, folder: Option<&str>) -> Result<Option<ObjectInfo>> {
        let Some(leaf) = entry.file_name().to_str().map(str::to_string) else {
            return Ok(None);
        };
        if leaf.starts_with('.') {
            return Ok(None);
        }
        let file_type = entry.file_type().await.map_err(ErrorKind::Io)?;
        if !file_type.is_file() {
            return Ok(None);
        }
        let name = match folder {
            Some(folder) => format!("{folder}/{leaf}"),
            None => leaf,
        };
        let file = fs::File::open(entry.path()).await.map_err(|e| Self::map_io_error(e, &name))?;
        let hash = md5_reader(file).await.map_err(ErrorKind::Io)?;
        Ok(Some(ObjectInfo { name, hash }))
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_containers(&self) -> Result<BTreeSet<String>> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .or_raise(|| ErrorKind::Authentication(format!("cannot read {}", self.root.display())))?;
        let mut containers = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
            let is_dir = entry.file_type().await.map_err(ErrorKind::Io)?.is_dir();
            if let Some(name) = entry.file_name().to_str()
                && is_dir
                && !name.starts_with('.')
            {
                containers.insert(name.to_string());
            }
        }
        Ok(containers)
    }

    fn list_stream<'a>(&'a self, container: &'a str, pseudofolder: Option<&'a str>) -> ObjectInfoStream<'a> {
        Box::pin(stream! {
            let mut directory = match self.container_path(container).await {
                Ok(path) => path,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            if let Some(folder) = pseudofolder {
                if let Err(e) = validate_name(folder) {
                    yield Err(e);
                    return;
                }
                directory.extend(folder.split('/'));
            }
            let mut entries = match fs::read_dir(&directory).await {
                Ok(entries) => entries,
                // To stay consistent with the behaviour of object stores,
                // asking for the contents of a pseudofolder that doesn't
                // exist results in an empty list not an error.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
                Err(err) => {
                    yield Err(exn::Exn::from(ErrorKind::Io(err)));
                    return;
                },
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => { yield Err(exn::Exn::from(ErrorKind::Io(e))); continue; },
                };
                match Self::process_entry(entry, pseudofolder).await {
                    Ok(Some(object)) if is_direct_child(&object.name, pseudofolder) => yield Ok(object),
                    Ok(_) => {},
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    async fn upload(&self, container: &str, name: &str, body: Body, _content_type: Option<&str>) -> Result<()> {
        let target = self.object_path(container, name).await?;
        let Some((parent, leaf)) = target.parent().zip(target.file_name()) else {
            exn::bail!(ErrorKind::InvalidName(name.to_string()));
        };
        fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, name))?;
        // Write next to the target then rename, so a listing never sees a
        // half-written object.
        let partial = parent.join(format!(".{}{PARTIAL_SUFFIX}", leaf.to_string_lossy()));
        let mut output = fs::File::create(&partial).await.map_err(|e| Self::map_io_error(e, name))?;
        let copied = match body {
            Body::File(mut file) => tokio::io::copy(&mut file, &mut output).await.map(|_| ()),
            Body::Bytes(bytes) => tokio::io::AsyncWriteExt::write_all(&mut output, &bytes).await,
        };
        let result = match copied {
            Ok(()) => output.sync_all().await,
            Err(e) => Err(e),
        };
        drop(output);
        if let Err(e) = result {
            _ = fs::remove_file(&partial).await;
            return Err(ErrorKind::Io(e).into());
        }
        Ok(fs::rename(&partial, &target).await.map_err(|e| Self::map_io_error(e, name))?)
    }

    async fn delete(&self, container: &str, name: &str) -> Result<()> {
        let target = self.object_path(container, name).await?;
        Ok(fs::remove_file(&target).await.map_err(|e| Self::map_io_error(e, name))?)
    }
}

#[async_trait]
impl Connector for LocalBackend {
    async fn connect(&self) -> Result<BackendHandle> {
        let session = Self::new(self.name.clone(), &self.root)?;
        // Reading the root is this backend's "login".
        session.list_containers().await?;
        Ok(Arc::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::md5_hex;

    fn backend_with(containers: &[&str]) -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        for container in containers {
            std::fs::create_dir(temp_dir.path().join(container)).unwrap();
        }
        let backend = LocalBackend::new("local", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_existing_absolute_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        let err = LocalBackend::new("name", "relative/path").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Authentication(_)));
        assert!(LocalBackend::new("name", temp_dir.path().join("missing")).is_err());
    }

    #[tokio::test]
    async fn test_list_containers() {
        let (temp_dir, backend) = backend_with(&["photos", "docs", ".hidden"]);
        std::fs::write(temp_dir.path().join("stray-file"), b"x").unwrap();
        let containers = backend.list_containers().await.unwrap();
        assert_eq!(containers.into_iter().collect::<Vec<_>>(), vec!["docs", "photos"]);
    }

    #[tokio::test]
    async fn test_upload_and_list() {
        let (_temp_dir, backend) = backend_with(&["photos"]);
        backend.upload("photos", "2023/a.jpg", Body::from(b"jpeg".to_vec()), Some("image/jpeg")).await.unwrap();
        backend.upload("photos", "2023/summer/b.jpg", Body::from(b"deeper".to_vec()), None).await.unwrap();
        backend.upload("photos", "top.jpg", Body::from(b"top".to_vec()), None).await.unwrap();

        let objects = backend.list("photos", Some("2023")).await.unwrap();
        assert_eq!(objects, vec![ObjectInfo::new("2023/a.jpg", md5_hex(b"jpeg"))]);
        let objects = backend.list("photos", None).await.unwrap();
        assert_eq!(objects, vec![ObjectInfo::new("top.jpg", md5_hex(b"top"))]);
    }

    #[tokio::test]
    async fn test_upload_replaces_existing() {
        let (temp_dir, backend) = backend_with(&["photos"]);
        backend.upload("photos", "a.txt", Body::from(b"one".to_vec()), None).await.unwrap();
        backend.upload("photos", "a.txt", Body::from(b"two".to_vec()), None).await.unwrap();
        assert_eq!(std::fs::read(temp_dir.path().join("photos/a.txt")).unwrap(), b"two");
        // No partial files left behind
        assert_eq!(std::fs::read_dir(temp_dir.path().join("photos")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_upload_streams_file() {
        let (temp_dir, backend) = backend_with(&["photos"]);
        let source = temp_dir.path().join("source.bin");
        std::fs::write(&source, b"streamed content").unwrap();
        let file = fs::File::open(&source).await.unwrap();
        backend.upload("photos", "x/source.bin", Body::from(file), None).await.unwrap();
        assert_eq!(std::fs::read(temp_dir.path().join("photos/x/source.bin")).unwrap(), b"streamed content");
    }

    #[tokio::test]
    async fn test_unknown_container() {
        let (_temp_dir, backend) = backend_with(&["photos"]);
        let err = backend.upload("videos", "a.mp4", Body::from(vec![]), None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownContainer(_)));
        let err = backend.list("videos", None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownContainer(_)));
    }

    #[tokio::test]
    async fn test_list_missing_pseudofolder_is_empty() {
        let (_temp_dir, backend) = backend_with(&["photos"]);
        assert!(backend.list("photos", Some("nope")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let (_temp_dir, backend) = backend_with(&["photos"]);
        backend.upload("photos", "a.jpg", Body::from(b"x".to_vec()), None).await.unwrap();
        backend.delete("photos", "a.jpg").await.unwrap();
        assert!(backend.list("photos", None).await.unwrap().is_empty());
        let err = backend.delete("photos", "a.jpg").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_name_security() {
        let (_temp_dir, backend) = backend_with(&["photos"]);
        assert!(backend.upload("photos", "../escape", Body::from(vec![]), None).await.is_err());
        assert!(backend.upload("..", "escape", Body::from(vec![]), None).await.is_err());
        assert!(backend.delete("photos", "a/../../b").await.is_err());
        assert!(backend.list("photos", Some("../..")).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_returns_independent_session() {
        let (_temp_dir, backend) = backend_with(&["photos"]);
        let session = backend.connect().await.unwrap();
        assert_eq!(session.name(), "local");
        assert!(session.list_containers().await.unwrap().contains("photos"));
    }
}
