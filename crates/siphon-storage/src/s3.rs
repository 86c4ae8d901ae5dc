use crate::traits::{BlobStore, ObjectMeta, StoreError, StoreResult};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::collections::HashMap;

/// S3 blob store.
///
/// The configured container name is the bucket. Object metadata rides as S3
/// user metadata; the authoritative size comes from `Content-Length` on head.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Create a new S3BlobStore instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name (the destination container)
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(bucket: String, region: String, endpoint_url: Option<String>) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = endpoint_url {
            // S3-compatible providers generally require path-style addressing.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        S3BlobStore {
            client: Client::from_conf(builder.build()),
            bucket,
        }
    }

    fn meta_from_head(size: u64, user_meta: Option<&HashMap<String, String>>) -> ObjectMeta {
        let field = |key: &str| {
            user_meta
                .and_then(|m| m.get(key))
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0)
        };
        ObjectMeta {
            size,
            modified_unix: field(ObjectMeta::KEY_MODIFIED),
            created_unix: field(ObjectMeta::KEY_CREATED),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn ensure_container(&self) -> StoreResult<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => return Ok(()),
            Err(err) => {
                let service_err = err.into_service_error();
                if !service_err.is_not_found() {
                    return Err(StoreError::BackendError(service_err.to_string()));
                }
            }
        }

        match self
            .client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
        {
            Ok(_) => {
                tracing::info!(bucket = %self.bucket, "Created destination bucket");
                Ok(())
            }
            Err(err) => {
                let service_err = err.into_service_error();
                // Another writer may have created it between head and create.
                if service_err.is_bucket_already_owned_by_you()
                    || service_err.is_bucket_already_exists()
                {
                    Ok(())
                } else {
                    Err(StoreError::BackendError(service_err.to_string()))
                }
            }
        }
    }

    async fn put_object(
        &self,
        blob_path: &str,
        data: Vec<u8>,
        meta: &ObjectMeta,
    ) -> StoreResult<()> {
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(blob_path)
            .body(ByteStream::from(Bytes::from(data)))
            .metadata(ObjectMeta::KEY_SIZE, meta.size.to_string())
            .metadata(ObjectMeta::KEY_MODIFIED, meta.modified_unix.to_string())
            .metadata(ObjectMeta::KEY_CREATED, meta.created_unix.to_string())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %aws_sdk_s3::error::DisplayErrorContext(&e),
                    bucket = %self.bucket,
                    blob_path = %blob_path,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 put failed"
                );
                StoreError::UploadFailed(e.into_service_error().to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            blob_path = %blob_path,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 put successful"
        );

        Ok(())
    }

    async fn object_meta(&self, blob_path: &str) -> StoreResult<Option<ObjectMeta>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(blob_path)
            .send()
            .await
        {
            Ok(output) => {
                let size = output.content_length().unwrap_or(0).max(0) as u64;
                Ok(Some(Self::meta_from_head(size, output.metadata())))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(None)
                } else {
                    Err(StoreError::BackendError(service_err.to_string()))
                }
            }
        }
    }

    async fn list_objects(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut paths = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let output = request
                .send()
                .await
                .map_err(|e| StoreError::BackendError(e.into_service_error().to_string()))?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    paths.push(key.to_string());
                }
            }

            if output.is_truncated().unwrap_or(false) {
                continuation = output.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }

        Ok(paths)
    }
}
