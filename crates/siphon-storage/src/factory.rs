#[cfg(feature = "storage-s3")]
use crate::S3BlobStore;
use crate::{BlobStore, LocalBlobStore, StoreError, StoreResult};
use siphon_core::{Config, StorageBackend};
use std::sync::Arc;

/// Create a blob store backend based on configuration
pub async fn create_store(config: &Config) -> StoreResult<Arc<dyn BlobStore>> {
    let backend = config.storage_backend.unwrap_or(StorageBackend::S3);

    match backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            // S3_BUCKET overrides the container name when bucket naming
            // rules require a different identifier.
            let bucket = config
                .s3_bucket
                .clone()
                .unwrap_or_else(|| config.container.clone());
            let region = config
                .s3_region
                .clone()
                .or_else(|| config.aws_region.clone())
                .ok_or_else(|| {
                    StoreError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
                })?;
            let endpoint = config.s3_endpoint.clone();

            let store = S3BlobStore::new(bucket, region, endpoint).await;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StoreError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        StorageBackend::Local => {
            let root = config.local_store_path.clone().ok_or_else(|| {
                StoreError::ConfigError("SIPHON_LOCAL_STORE_PATH not configured".to_string())
            })?;

            let store = LocalBlobStore::new(root, config.container.clone());
            store.ensure_container().await?;
            Ok(Arc::new(store))
        }
    }
}
