//! Configuration module
//!
//! Environment-driven configuration for the ingestion pipeline: batching and
//! concurrency knobs, staging layout, and the destination blob store.

use std::env;
use std::path::PathBuf;

// Defaults for knobs that are usually left alone
const BATCH_COUNT: usize = 10;
const WORKER_POOL_SIZE: usize = 4;
const FETCH_CONCURRENCY: usize = 3;
const WORKER_TIMEOUT_SECS: u64 = 300;
const DOWNLOAD_ROOT: &str = "downloads";
const SOURCES_PATH: &str = "sources.json";

/// Blob store backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Local,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of round-robin batches the source entries are split into.
    pub batch_count: usize,
    /// Maximum number of batches processed at the same time.
    pub worker_pool_size: usize,
    /// Concurrent fetches within a batch. 1 means strictly sequential.
    pub fetch_concurrency: usize,
    /// Wall-clock budget for a single batch.
    pub worker_timeout_secs: u64,
    /// Root of the local staging area.
    pub download_root: PathBuf,
    /// Destination container (bucket for the S3 backend).
    pub container: String,
    /// Path to the source list JSON file.
    pub sources_path: PathBuf,
    // Storage backend configuration
    pub storage_backend: Option<StorageBackend>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers
    pub aws_region: Option<String>,
    pub local_store_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let storage_backend =
            env::var("SIPHON_STORAGE_BACKEND")
                .ok()
                .and_then(|s| match s.to_lowercase().as_str() {
                    "s3" => Some(StorageBackend::S3),
                    "local" => Some(StorageBackend::Local),
                    _ => None,
                });

        let config = Config {
            batch_count: env::var("SIPHON_BATCH_COUNT")
                .unwrap_or_else(|_| BATCH_COUNT.to_string())
                .parse()
                .unwrap_or(BATCH_COUNT),
            worker_pool_size: env::var("SIPHON_WORKER_POOL_SIZE")
                .unwrap_or_else(|_| WORKER_POOL_SIZE.to_string())
                .parse()
                .unwrap_or(WORKER_POOL_SIZE),
            fetch_concurrency: env::var("SIPHON_FETCH_CONCURRENCY")
                .unwrap_or_else(|_| FETCH_CONCURRENCY.to_string())
                .parse()
                .unwrap_or(FETCH_CONCURRENCY),
            worker_timeout_secs: env::var("SIPHON_WORKER_TIMEOUT_SECS")
                .unwrap_or_else(|_| WORKER_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(WORKER_TIMEOUT_SECS),
            download_root: env::var("SIPHON_DOWNLOAD_ROOT")
                .unwrap_or_else(|_| DOWNLOAD_ROOT.to_string())
                .into(),
            container: env::var("SIPHON_CONTAINER")
                .map_err(|_| anyhow::anyhow!("SIPHON_CONTAINER must be set"))?,
            sources_path: env::var("SIPHON_SOURCES")
                .unwrap_or_else(|_| SOURCES_PATH.to_string())
                .into(),
            storage_backend,
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            aws_region: env::var("AWS_REGION").ok(),
            local_store_path: env::var("SIPHON_LOCAL_STORE_PATH").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.batch_count == 0 {
            return Err(anyhow::anyhow!("SIPHON_BATCH_COUNT must be at least 1"));
        }
        if self.worker_pool_size == 0 {
            return Err(anyhow::anyhow!("SIPHON_WORKER_POOL_SIZE must be at least 1"));
        }
        if self.fetch_concurrency == 0 {
            return Err(anyhow::anyhow!("SIPHON_FETCH_CONCURRENCY must be at least 1"));
        }
        if self.container.is_empty() {
            return Err(anyhow::anyhow!("SIPHON_CONTAINER must not be empty"));
        }
        // Bucket naming rules; enforced for both backends so names are portable.
        if self.container.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(anyhow::anyhow!("SIPHON_CONTAINER must be lowercase"));
        }

        match self.storage_backend.unwrap_or(StorageBackend::S3) {
            StorageBackend::S3 => {
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_store_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "SIPHON_LOCAL_STORE_PATH must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}
