//! Object storage capability for swiftsync.
//!
//! The sync engine never talks to a storage service directly: it consumes a
//! [`StorageBackend`] session obtained from a [`Connector`]. Each worker
//! connects once and owns its session for its whole lifetime; sessions are
//! never shared between workers.
//!
//! # Naming
//! - A **container** is a top-level namespace (a Swift container, an S3
//!   bucket, a directory under the [`LocalBackend`](backend::LocalBackend) root).
//! - An **object name** is a `/`-separated key inside a container. Everything
//!   before the last `/` is the object's **pseudofolder**.

pub mod backend;
pub mod error;
mod hash;
mod models;
mod name;

pub use crate::backend::{Body, Connector, StorageBackend};
pub use crate::hash::{HASH_CHUNK_SIZE, md5_hex, md5_reader};
pub use crate::models::ObjectInfo;
pub use crate::name::validate as validate_name;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
