//! Storage backend trait and implementations.
//!
//! This module defines the [`StorageBackend`] trait, the capability the sync
//! engine consumes: list containers, list objects under a pseudofolder,
//! upload a stream of bytes with a content type, delete an object. It also
//! defines [`Connector`], which authenticates and hands out a fresh session.

mod local;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::{MockBackend, Upload};
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::BackendHandle;
use crate::error::Result;
use crate::models::ObjectInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::collections::BTreeSet;
use std::pin::Pin;

type ObjectInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<ObjectInfo>> + Send + 'a>>;

/// Content to upload.
///
/// Files are streamed by backends that support it; nothing forces the whole
/// file into memory.
#[derive(Debug)]
pub enum Body {
    /// An open local file, read from its current position to the end.
    File(tokio::fs::File),
    /// An in-memory buffer.
    Bytes(Vec<u8>),
}
impl From<tokio::fs::File> for Body {
    fn from(file: tokio::fs::File) -> Self {
        Self::File(file)
    }
}
impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}
impl Body {
    /// Drain the body into memory. Only for backends without streaming
    /// support (and tests).
    pub async fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::File(mut file) => {
                let mut buffer = Vec::new();
                tokio::io::AsyncReadExt::read_to_end(&mut file, &mut buffer).await?;
                Ok(buffer)
            },
        }
    }
}

/// Unified interface for object storage sessions.
///
/// A value implementing this trait is one authenticated session. It is
/// created by a [`Connector`], used for every operation of one worker, and
/// dropped when that worker stops.
///
/// # Examples
///
/// ```
/// use swiftsync_storage::{StorageBackend, error::Result};
///
/// async fn total_in_folder(backend: &dyn StorageBackend) -> Result<usize> {
///     let objects = backend.list("photos", Some("2023")).await?;
///     Ok(objects.len())
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// All containers visible to this session.
    async fn list_containers(&self) -> Result<BTreeSet<String>>;

    /// List objects directly inside a pseudofolder.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, container: &str, pseudofolder: Option<&str>) -> Result<Vec<ObjectInfo>> {
        self.list_stream(container, pseudofolder).try_collect().await
    }

    /// Stream objects directly inside a pseudofolder.
    ///
    /// With `Some("2023")` this yields `2023/a.jpg` but neither
    /// `2023/summer/b.jpg` (nested deeper) nor `2023.jpg`. With `None` it
    /// yields only the objects at the container root (names without `/`).
    ///
    /// Listing a pseudofolder that holds nothing results in an empty stream,
    /// not an error. Listing a container that does not exist is an
    /// [`UnknownContainer`](crate::error::ErrorKind::UnknownContainer) error.
    fn list_stream<'a>(&'a self, container: &'a str, pseudofolder: Option<&'a str>) -> ObjectInfoStream<'a>;

    /// Create or replace an object.
    ///
    /// `content_type` of [`None`] leaves the choice to the backend.
    /// Re-uploading identical content is harmless.
    async fn upload(&self, container: &str, name: &str, body: Body, content_type: Option<&str>) -> Result<()>;

    /// Delete an object.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn delete(&self, container: &str, name: &str) -> Result<()>;
}

/// Authenticates against a storage service and hands out sessions.
///
/// Called once per worker; every call must return an independent session.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new session.
    ///
    /// Invalid credentials or an unreachable endpoint are reported as
    /// [`Authentication`](crate::error::ErrorKind::Authentication).
    async fn connect(&self) -> Result<BackendHandle>;
}

/// Does `name` sit directly inside `pseudofolder`?
pub(crate) fn is_direct_child(name: &str, pseudofolder: Option<&str>) -> bool {
    match pseudofolder {
        Some(folder) => name
            .strip_prefix(folder)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|leaf| !leaf.is_empty() && !leaf.contains('/')),
        None => !name.contains('/'),
    }
}
