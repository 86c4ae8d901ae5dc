//! Per-entry processing: fetch, expand, upload, cleanup.
//!
//! `handle_entry` is the error boundary of the pipeline. Whatever goes wrong
//! with one file is logged and counted here; nothing escapes to the batch.
//! Staging cleanup runs on every path out, success or failure.

use std::path::PathBuf;
use std::sync::Arc;

use siphon_core::{ServerUrl, SourceEntry};
use siphon_fetch::{resolve_fetcher, FetchError, ProtocolFetcher};
use siphon_storage::BlobStore;

use crate::cleanup::cleanup_path;
use crate::expand::{expand_container, extraction_dir, is_container};
use crate::upload::{StagedFile, UploadOutcome, Uploader};

/// Outcome counters for one entry (a container entry can produce several).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EntryStats {
    pub uploaded: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl EntryStats {
    pub fn failed_one() -> Self {
        EntryStats {
            failed: 1,
            ..Default::default()
        }
    }

    pub fn absorb(&mut self, other: EntryStats) {
        self.uploaded += other.uploaded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    fn record(&mut self, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Uploaded { .. } => self.uploaded += 1,
            UploadOutcome::SkippedDuplicate { .. } => self.skipped += 1,
        }
    }
}

/// Processes one source entry end to end.
#[derive(Clone)]
pub struct EntryHandler {
    uploader: Uploader,
    download_root: PathBuf,
    fetcher_override: Option<Arc<dyn ProtocolFetcher>>,
}

impl EntryHandler {
    pub fn new(store: Arc<dyn BlobStore>, download_root: PathBuf) -> Self {
        EntryHandler {
            uploader: Uploader::new(store),
            download_root,
            fetcher_override: None,
        }
    }

    /// Use one fixed fetcher for every protocol. For tests.
    pub fn with_fetcher(
        store: Arc<dyn BlobStore>,
        download_root: PathBuf,
        fetcher: Arc<dyn ProtocolFetcher>,
    ) -> Self {
        EntryHandler {
            uploader: Uploader::new(store),
            download_root,
            fetcher_override: Some(fetcher),
        }
    }

    pub fn download_root(&self) -> &std::path::Path {
        &self.download_root
    }

    /// Fetch, expand, upload, clean up. Never fails; errors become counts.
    pub async fn handle_entry(&self, entry: &SourceEntry) -> EntryStats {
        let server = match ServerUrl::parse(&entry.server) {
            Ok(server) => server,
            Err(e) => {
                tracing::error!(server = %entry.server, error = %e, "Invalid server URL");
                return EntryStats::failed_one();
            }
        };

        let fetcher = self
            .fetcher_override
            .clone()
            .unwrap_or_else(|| resolve_fetcher(server.protocol));

        let fetched = match fetcher
            .fetch(&server, &entry.remote_path, &self.download_root)
            .await
        {
            Ok(fetched) => fetched,
            Err(FetchError::NotFound(path)) => {
                tracing::warn!(server = %server, remote_path = %path, "Remote file not found");
                return EntryStats::failed_one();
            }
            Err(e) => {
                tracing::error!(
                    server = %server,
                    remote_path = %entry.remote_path,
                    error = %e,
                    "Fetch failed"
                );
                return EntryStats::failed_one();
            }
        };

        let server_folder = server.folder_name();
        let mut stats = EntryStats::default();

        if is_container(&fetched.file_type) {
            let extract_dir = extraction_dir(&fetched.local_path, &self.download_root);
            match expand_container(&fetched.local_path, &self.download_root) {
                Ok(members) => {
                    for member in &members {
                        let staged =
                            StagedFile::from_member(member, &server_folder, fetched.created_unix);
                        self.upload_one(&staged, &mut stats).await;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        container = %fetched.local_path.display(),
                        error = %e,
                        "Container expansion failed"
                    );
                    stats.failed += 1;
                }
            }
            cleanup_path(&extract_dir).await;
            // The container itself is removed by expansion; this covers the
            // paths where it is not.
            cleanup_path(&fetched.local_path).await;
        } else {
            let staged = StagedFile::from_fetch(&fetched, &server_folder);
            self.upload_one(&staged, &mut stats).await;
            cleanup_path(&fetched.local_path).await;
        }

        stats
    }

    async fn upload_one(&self, staged: &StagedFile, stats: &mut EntryStats) {
        match self.uploader.upload(staged).await {
            Ok(outcome) => stats.record(&outcome),
            Err(e) => {
                tracing::error!(
                    file = %staged.file_name,
                    server_folder = %staged.server_folder,
                    error = %e,
                    "Upload failed"
                );
                stats.failed += 1;
            }
        }
    }
}
