//! Turning the storage configuration into a session factory.

use std::sync::Arc;
use swiftsync_config::StorageConfig;
use swiftsync_storage::Connector;
use swiftsync_storage::backend::LocalBackend;
use swiftsync_storage::error::Result;

pub fn connector(config: &StorageConfig) -> Result<Arc<dyn Connector>> {
    let connector: Arc<dyn Connector> = match config {
        StorageConfig::Local { root } => Arc::new(LocalBackend::new(config.name(), root)?),
        #[cfg(feature = "s3")]
        StorageConfig::S3 { region, endpoint, key_id, key_secret } => {
            Arc::new(swiftsync_storage::backend::S3Backend::new(
                config.name(),
                region.as_str(),
                endpoint.as_deref(),
                key_id.as_str(),
                key_secret.as_str(),
            ))
        },
        #[cfg(not(feature = "s3"))]
        StorageConfig::S3 { .. } => {
            exn::bail!(swiftsync_storage::error::ErrorKind::BackendError("built without S3 support".to_string()))
        },
    };
    Ok(connector)
}
