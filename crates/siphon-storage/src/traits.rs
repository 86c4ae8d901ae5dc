//! Blob store abstraction trait
//!
//! This module defines the BlobStore trait that all storage backends must
//! implement, plus the metadata record attached to every stored object.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Blob store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for blob store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Metadata attached to every stored object.
///
/// `size` and `modified_unix` together identify an object's content for
/// duplicate detection; `created_unix` is kept for auditing only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub size: u64,
    pub modified_unix: i64,
    pub created_unix: i64,
}

impl ObjectMeta {
    // User-metadata keys shared by backends that store metadata as string maps.
    pub const KEY_SIZE: &'static str = "file-size";
    pub const KEY_MODIFIED: &'static str = "modified-unix";
    pub const KEY_CREATED: &'static str = "created-unix";

    /// Duplicate test: same byte count and same modification time (seconds).
    pub fn matches(&self, size: u64, modified_unix: i64) -> bool {
        self.size == size && self.modified_unix == modified_unix
    }
}

/// Blob store abstraction trait
///
/// All destination backends (S3, local filesystem) implement this trait so
/// the upload pipeline never couples to a specific provider. Absence is a
/// value, not an error: `object_meta` returns `Ok(None)` for paths that do
/// not exist.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create the destination container (bucket/directory) if it does not
    /// already exist. Idempotent.
    async fn ensure_container(&self) -> StoreResult<()>;

    /// Store an object at `blob_path` with its metadata, overwriting any
    /// existing object at that path.
    async fn put_object(&self, blob_path: &str, data: Vec<u8>, meta: &ObjectMeta)
        -> StoreResult<()>;

    /// Fetch the metadata of the object at `blob_path`, or `None` if absent.
    async fn object_meta(&self, blob_path: &str) -> StoreResult<Option<ObjectMeta>>;

    /// List blob paths under the given prefix. An empty prefix lists the
    /// whole container.
    async fn list_objects(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_matches_on_size_and_mtime() {
        let meta = ObjectMeta {
            size: 1024,
            modified_unix: 1_700_000_000,
            created_unix: 1_700_000_100,
        };
        assert!(meta.matches(1024, 1_700_000_000));
        assert!(!meta.matches(1025, 1_700_000_000));
        assert!(!meta.matches(1024, 1_700_000_001));
    }

    #[test]
    fn meta_roundtrips_through_json() {
        let meta = ObjectMeta {
            size: 42,
            modified_unix: 1_700_000_000,
            created_unix: 1_700_000_001,
        };
        let raw = serde_json::to_string(&meta).unwrap();
        let back: ObjectMeta = serde_json::from_str(&raw).unwrap();
        assert_eq!(meta, back);
    }
}
