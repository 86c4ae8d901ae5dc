use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use filetime::FileTime;
use siphon_core::{file_type_of, sanitize_file_name, Protocol, ServerUrl};
use thiserror::Error;

/// Fetch operation errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Remote path not found: {0}")]
    NotFound(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Size mismatch for {path}: expected {expected} bytes, staged {actual}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A successfully staged remote file.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub local_path: PathBuf,
    /// Sanitized filename, identical to the last component of `local_path`.
    pub file_name: String,
    pub file_type: String,
    pub size: u64,
    /// Remote modification time, seconds since the epoch.
    pub modified_unix: i64,
    /// Ingestion time; remote protocols expose no creation time.
    pub created_unix: i64,
}

/// Where a remote file lands in the staging area.
#[derive(Debug, Clone)]
pub struct StagingLocation {
    pub dir: PathBuf,
    pub file_name: String,
    pub file_type: String,
}

impl StagingLocation {
    pub fn local_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

/// Compute the staging location for a remote path:
/// `{download_root}/{server_folder}/{file_type}/{sanitized_name}`.
pub fn staging_location(
    download_root: &Path,
    server: &ServerUrl,
    remote_path: &str,
) -> StagingLocation {
    let raw_name = remote_path.rsplit('/').next().unwrap_or(remote_path);
    let file_name = sanitize_file_name(raw_name);
    let file_type = file_type_of(&file_name);
    let dir = download_root.join(server.folder_name()).join(&file_type);
    StagingLocation {
        dir,
        file_name,
        file_type,
    }
}

/// Downloads one remote file into the staging area.
#[async_trait]
pub trait ProtocolFetcher: Send + Sync {
    async fn fetch(
        &self,
        server: &ServerUrl,
        remote_path: &str,
        download_root: &Path,
    ) -> Result<FetchResult, FetchError>;
}

/// Pick the fetcher for a protocol.
pub fn resolve_fetcher(protocol: Protocol) -> Arc<dyn ProtocolFetcher> {
    match protocol {
        Protocol::Ftp => Arc::new(crate::FtpFetcher),
        Protocol::Sftp => Arc::new(crate::SftpFetcher),
    }
}

/// Verify the staged byte count against the remote size and restore the
/// remote mtime. A mismatched partial file is removed before returning.
pub(crate) fn finalize_download(
    path: &Path,
    remote_path: &str,
    expected: u64,
    modified_unix: i64,
) -> Result<(), FetchError> {
    let actual = std::fs::metadata(path)?.len();
    if actual != expected {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to remove partial download"
            );
        }
        return Err(FetchError::SizeMismatch {
            path: remote_path.to_string(),
            expected,
            actual,
        });
    }

    filetime::set_file_mtime(path, FileTime::from_unix_time(modified_unix, 0))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_location_layout() {
        let server = ServerUrl::parse("ftp://ftp.example.com").unwrap();
        let loc = staging_location(Path::new("downloads"), &server, "/outgoing/Report 2024.CSV");
        assert_eq!(
            loc.local_path(),
            PathBuf::from("downloads/ftp.example.com_21/csv/Report_2024.CSV")
        );
        assert_eq!(loc.file_name, "Report_2024.CSV");
        assert_eq!(loc.file_type, "csv");
    }

    #[test]
    fn staging_location_handles_bare_name() {
        let server = ServerUrl::parse("sftp://host.example.com").unwrap();
        let loc = staging_location(Path::new("downloads"), &server, "archive.zip");
        assert_eq!(
            loc.local_path(),
            PathBuf::from("downloads/host.example.com_22/zip/archive.zip")
        );
    }

    #[test]
    fn finalize_accepts_matching_size_and_sets_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        std::fs::write(&path, b"12345").unwrap();

        finalize_download(&path, "/remote/file.bin", 5, 1_600_000_000).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        let mtime = FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime.unix_seconds(), 1_600_000_000);
    }

    #[test]
    fn finalize_removes_partial_on_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin");
        std::fs::write(&path, b"123").unwrap();

        let result = finalize_download(&path, "/remote/file.bin", 5, 0);
        assert!(matches!(result, Err(FetchError::SizeMismatch { .. })));
        assert!(!path.exists());
    }
}
