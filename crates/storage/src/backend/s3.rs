//! S3-compatible storage backend.
//!
//! Buckets are containers; object keys are object names. Works with AWS S3
//! and S3-compatible services (Swift's S3 middleware, MinIO, Backblaze B2,
//! Tigris, ...).
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file.
//!
//! # Hashes
//!
//! Object hashes are the `ETag` with its quotes stripped, which is the
//! content MD5 for single-part uploads. Objects uploaded in multiple parts
//! by another tool carry a `<md5>-<parts>` ETag and will always audit as
//! modified.

use crate::backend::{Body, Connector, ObjectInfoStream, is_direct_child};
use crate::error::{ErrorKind, Result};
use crate::{BackendHandle, ObjectInfo, StorageBackend, validate_name};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
};
use exn::ResultExt;
use std::collections::BTreeSet;
use std::sync::Arc;

/// S3-compatible storage backend.
///
/// # Examples
///
/// ```no_run
/// use swiftsync_storage::backend::S3Backend;
///
/// let backend = S3Backend::new(
///     "object-store",
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com".to_string()),
///     "access_key_id",
///     "secret_access_key",
/// );
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// No request is made here; credentials are first exercised by
    /// [`connect`](Connector::connect).
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in display/logging)
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        let credentials = Credentials::new(key_id, key_secret, None, None, "swiftsync-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.into()))
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        // Set custom endpoint for non-AWS services
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self { name: name.into(), client: Client::from_conf(config_builder.build()) }
    }

    fn network_error<E, R>(err: &SdkError<E, R>) -> ErrorKind
    where
        E: std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        ErrorKind::Network(DisplayErrorContext(err).to_string())
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_containers(&self) -> Result<BTreeSet<String>> {
        let output = self.client.list_buckets().send().await.map_err(|e| Self::network_error(&e))?;
        Ok(output.buckets().iter().filter_map(|bucket| bucket.name()).map(str::to_string).collect())
    }

    fn list_stream<'a>(&'a self, container: &'a str, pseudofolder: Option<&'a str>) -> ObjectInfoStream<'a> {
        Box::pin(stream! {
            if let Some(Err(e)) = pseudofolder.map(validate_name) {
                yield Err(e);
                return;
            }
            // The delimiter keeps deeper "folders" out of `contents()`, they
            // only show up as common prefixes which are ignored here.
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(container)
                .set_prefix(pseudofolder.map(|folder| format!("{folder}/")))
                .delimiter("/")
                .into_paginator()
                .send();
            while let Some(page) = pages.next().await {
                let page = match page {
                    Ok(page) => page,
                    Err(e) => {
                        let kind = match e.as_service_error() {
                            Some(service) if service.is_no_such_bucket() => {
                                ErrorKind::UnknownContainer(container.to_string())
                            },
                            _ => Self::network_error(&e),
                        };
                        yield Err(exn::Exn::from(kind));
                        return;
                    },
                };
                for object in page.contents() {
                    let (Some(key), Some(etag)) = (object.key(), object.e_tag()) else {
                        continue;
                    };
                    if is_direct_child(key, pseudofolder) {
                        yield Ok(ObjectInfo::new(key, etag.trim_matches('"')));
                    }
                }
            }
        })
    }

    async fn upload(&self, container: &str, name: &str, body: Body, content_type: Option<&str>) -> Result<()> {
        let name = validate_name(name)?;
        let stream = match body {
            Body::File(file) => ByteStream::read_from()
                .file(file)
                .build()
                .await
                .or_raise(|| ErrorKind::BackendError(format!("cannot stream {name}")))?,
            Body::Bytes(bytes) => ByteStream::from(bytes),
        };
        self.client
            .put_object()
            .bucket(container)
            .key(name)
            .body(stream)
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(|e| Self::network_error(&e))?;
        Ok(())
    }

    /// S3 reports success for keys that do not exist, so unlike the other
    /// backends this never returns [`NotFound`](ErrorKind::NotFound).
    async fn delete(&self, container: &str, name: &str) -> Result<()> {
        let name = validate_name(name)?;
        self.client
            .delete_object()
            .bucket(container)
            .key(name)
            .send()
            .await
            .map_err(|e| Self::network_error(&e))?;
        Ok(())
    }
}

#[async_trait]
impl Connector for S3Backend {
    /// A fresh client per session; listing buckets is the credential check.
    async fn connect(&self) -> Result<BackendHandle> {
        let session = Self { name: self.name.clone(), client: Client::from_conf(self.client.config().clone()) };
        session
            .list_containers()
            .await
            .or_raise(|| ErrorKind::Authentication(format!("cannot list buckets on {}", self.name)))?;
        Ok(Arc::new(session))
    }
}
