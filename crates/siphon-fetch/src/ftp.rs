use std::path::Path;

use async_trait::async_trait;
use siphon_core::ServerUrl;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode, Status};

use crate::traits::{
    finalize_download, staging_location, FetchError, FetchResult, ProtocolFetcher,
};

/// FTP fetcher backed by a blocking `suppaftp` session per fetch.
pub struct FtpFetcher;

#[async_trait]
impl ProtocolFetcher for FtpFetcher {
    async fn fetch(
        &self,
        server: &ServerUrl,
        remote_path: &str,
        download_root: &Path,
    ) -> Result<FetchResult, FetchError> {
        let server = server.clone();
        let remote_path = remote_path.to_string();
        let download_root = download_root.to_path_buf();

        tokio::task::spawn_blocking(move || fetch_sync(&server, &remote_path, &download_root))
            .await
            .map_err(|e| FetchError::Protocol(format!("FTP fetch task panicked: {e}")))?
    }
}

fn fetch_sync(
    server: &ServerUrl,
    remote_path: &str,
    download_root: &Path,
) -> Result<FetchResult, FetchError> {
    let start = std::time::Instant::now();

    let mut ftp = FtpStream::connect((server.host.as_str(), server.port))
        .map_err(|e| FetchError::Protocol(format!("Connect to {server}: {e}")))?;
    ftp.set_mode(Mode::ExtendedPassive);

    let user = server.username.as_deref().unwrap_or("anonymous");
    let pass = server.password.as_deref().unwrap_or("anonymous");
    ftp.login(user, pass)
        .map_err(|e| FetchError::Protocol(format!("Login to {server}: {e}")))?;
    ftp.transfer_type(FileType::Binary)
        .map_err(|e| FetchError::Protocol(format!("Set binary mode on {server}: {e}")))?;

    // Stat before transfer: size for verification, mtime for preservation.
    let size = ftp.size(remote_path).map_err(|e| map_ftp_err(remote_path, e))? as u64;
    let modified_unix = ftp
        .mdtm(remote_path)
        .map_err(|e| map_ftp_err(remote_path, e))?
        .and_utc()
        .timestamp();

    let location = staging_location(download_root, server, remote_path);
    std::fs::create_dir_all(&location.dir)?;
    let local_path = location.local_path();
    let mut local = std::fs::File::create(&local_path)?;

    // Stream straight to the staging file; large archives never sit in memory.
    let mut remote = ftp
        .retr_as_stream(remote_path)
        .map_err(|e| map_ftp_err(remote_path, e))?;
    std::io::copy(&mut remote, &mut local)?;
    ftp.finalize_retr_stream(remote)
        .map_err(|e| map_ftp_err(remote_path, e))?;
    drop(local);

    if let Err(e) = ftp.quit() {
        tracing::warn!(server = %server, error = %e, "FTP quit failed");
    }

    finalize_download(&local_path, remote_path, size, modified_unix)?;

    tracing::info!(
        server = %server,
        remote_path = %remote_path,
        local_path = %local_path.display(),
        size_bytes = size,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "FTP fetch successful"
    );

    Ok(FetchResult {
        local_path,
        file_name: location.file_name,
        file_type: location.file_type,
        size,
        modified_unix,
        created_unix: chrono::Utc::now().timestamp(),
    })
}

fn map_ftp_err(remote_path: &str, err: FtpError) -> FetchError {
    if let FtpError::UnexpectedResponse(response) = &err {
        if let Some(not_found) = classify_status(remote_path, response.status) {
            return not_found;
        }
    }
    FetchError::Protocol(format!("{remote_path}: {err}"))
}

/// 550 means the file does not exist (or is unreadable, which we treat the
/// same way). Everything else stays a protocol error.
fn classify_status(remote_path: &str, status: Status) -> Option<FetchError> {
    if status == Status::FileUnavailable {
        Some(FetchError::NotFound(remote_path.to_string()))
    } else {
        None
    }
}
