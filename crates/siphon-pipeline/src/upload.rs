//! Duplicate-aware upload.
//!
//! The canonical blob path is `{server_folder}/{file_type}/{file_name}`. An
//! existing object there with the same size and modification time makes the
//! upload a skip. A same-named object with different content forces a
//! disambiguated path with an epoch segment before the filename. Every
//! completed upload is verified by reading the stored size back.

use std::path::PathBuf;
use std::sync::Arc;

use siphon_fetch::FetchResult;
use siphon_storage::{BlobStore, ObjectMeta, StoreError};
use thiserror::Error;

use crate::expand::ArchiveMember;

/// Upload errors
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Stored size mismatch at {blob_path}: sent {expected} bytes, store reports {actual}")]
    SizeMismatch {
        blob_path: String,
        expected: u64,
        actual: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A local file ready for upload, with the identity fields that determine
/// its blob path.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub local_path: PathBuf,
    pub server_folder: String,
    pub file_name: String,
    pub file_type: String,
    pub size: u64,
    pub modified_unix: i64,
    pub created_unix: i64,
}

impl StagedFile {
    pub fn from_fetch(fetched: &FetchResult, server_folder: &str) -> Self {
        StagedFile {
            local_path: fetched.local_path.clone(),
            server_folder: server_folder.to_string(),
            file_name: fetched.file_name.clone(),
            file_type: fetched.file_type.clone(),
            size: fetched.size,
            modified_unix: fetched.modified_unix,
            created_unix: fetched.created_unix,
        }
    }

    pub fn from_member(member: &ArchiveMember, server_folder: &str, created_unix: i64) -> Self {
        StagedFile {
            local_path: member.local_path.clone(),
            server_folder: server_folder.to_string(),
            file_name: member.file_name.clone(),
            file_type: member.file_type.clone(),
            size: member.size,
            modified_unix: member.modified_unix,
            created_unix,
        }
    }

    fn canonical_blob_path(&self) -> String {
        format!(
            "{}/{}/{}",
            self.server_folder, self.file_type, self.file_name
        )
    }

    fn disambiguated_blob_path(&self, epoch: i64) -> String {
        format!(
            "{}/{}/{}/{}",
            self.server_folder, self.file_type, epoch, self.file_name
        )
    }
}

/// The outcome of handling one staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { blob_path: String },
    SkippedDuplicate { blob_path: String },
}

/// Uploads staged files into a shared blob store.
#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn BlobStore>,
}

impl Uploader {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Uploader { store }
    }

    pub async fn upload(&self, staged: &StagedFile) -> Result<UploadOutcome, UploadError> {
        let canonical = staged.canonical_blob_path();

        let blob_path = match self.store.object_meta(&canonical).await? {
            Some(existing) if existing.matches(staged.size, staged.modified_unix) => {
                tracing::info!(
                    blob_path = %canonical,
                    size_bytes = staged.size,
                    "Duplicate already stored, skipping upload"
                );
                return Ok(UploadOutcome::SkippedDuplicate {
                    blob_path: canonical,
                });
            }
            Some(_) => {
                // Same name, different content: keep both.
                let path = staged.disambiguated_blob_path(chrono::Utc::now().timestamp());
                tracing::info!(
                    canonical = %canonical,
                    blob_path = %path,
                    "Name collision with different content, storing under epoch path"
                );
                path
            }
            None => canonical,
        };

        let data = tokio::fs::read(&staged.local_path).await?;
        let meta = ObjectMeta {
            size: staged.size,
            modified_unix: staged.modified_unix,
            created_unix: staged.created_unix,
        };
        self.store.put_object(&blob_path, data, &meta).await?;

        // Read the stored size back; a short write is an error, not a shrug.
        let stored_size = self
            .store
            .object_meta(&blob_path)
            .await?
            .map(|m| m.size)
            .unwrap_or(0);
        if stored_size != staged.size {
            return Err(UploadError::SizeMismatch {
                blob_path,
                expected: staged.size,
                actual: stored_size,
            });
        }

        Ok(UploadOutcome::Uploaded { blob_path })
    }
}
