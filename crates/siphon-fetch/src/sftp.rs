use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use siphon_core::ServerUrl;
use ssh2::{ErrorCode, Session};

use crate::traits::{
    finalize_download, staging_location, FetchError, FetchResult, ProtocolFetcher,
};

const TCP_TIMEOUT_SECS: u64 = 30;

// LIBSSH2_FX_NO_SUCH_FILE
const SFTP_NO_SUCH_FILE: i32 = 2;

/// SFTP fetcher backed by a blocking `ssh2` session per fetch.
pub struct SftpFetcher;

#[async_trait]
impl ProtocolFetcher for SftpFetcher {
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
            .map_err(|e| FetchError::Protocol(format!("SFTP fetch task panicked: {e}")))?
    }
}

fn fetch_sync(
    server: &ServerUrl,
    remote_path: &str,
    download_root: &Path,
) -> Result<FetchResult, FetchError> {
    let start = std::time::Instant::now();

    let tcp = TcpStream::connect((server.host.as_str(), server.port))
        .map_err(|e| FetchError::Protocol(format!("Connect to {server}: {e}")))?;
    tcp.set_read_timeout(Some(Duration::from_secs(TCP_TIMEOUT_SECS)))?;
    tcp.set_write_timeout(Some(Duration::from_secs(TCP_TIMEOUT_SECS)))?;

    let mut session = Session::new()
        .map_err(|e| FetchError::Protocol(format!("SSH session init: {e}")))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| FetchError::Protocol(format!("SSH handshake with {server}: {e}")))?;

    let user = server.username.as_deref().unwrap_or("anonymous");
    session
        .userauth_password(user, server.password.as_deref().unwrap_or(""))
        .map_err(|e| FetchError::Protocol(format!("SSH auth for {user}@{server}: {e}")))?;
    if !session.authenticated() {
        return Err(FetchError::Protocol(format!(
            "SSH auth failed for {user}@{server}"
        )));
    }

    let sftp = session
        .sftp()
        .map_err(|e| FetchError::Protocol(format!("Open SFTP channel on {server}: {e}")))?;

    // Stat before transfer: size for verification, mtime for preservation.
    let stat = sftp
        .stat(Path::new(remote_path))
        .map_err(|e| map_sftp_err(remote_path, e))?;
    let size = stat_size(remote_path, &stat)?;
    let modified_unix = stat.mtime.unwrap_or(0) as i64;

    let mut remote = sftp
        .open(Path::new(remote_path))
        .map_err(|e| map_sftp_err(remote_path, e))?;

    let location = staging_location(download_root, server, remote_path);
    std::fs::create_dir_all(&location.dir)?;
    let local_path = location.local_path();
    let mut local = std::fs::File::create(&local_path)?;
    std::io::copy(&mut remote, &mut local)?;
    drop(local);

    finalize_download(&local_path, remote_path, size, modified_unix)?;

    tracing::info!(
        server = %server,
        remote_path = %remote_path,
        local_path = %local_path.display(),
        size_bytes = size,
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "SFTP fetch successful"
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

/// Without an authoritative remote size the post-transfer verification would
/// reject every download, so a stat that omits it fails before the transfer.
fn stat_size(remote_path: &str, stat: &ssh2::FileStat) -> Result<u64, FetchError> {
    stat.size.ok_or_else(|| {
        FetchError::Protocol(format!("{remote_path}: remote stat reported no size"))
    })
}

fn map_sftp_err(remote_path: &str, err: ssh2::Error) -> FetchError {
    match err.code() {
        ErrorCode::SFTP(SFTP_NO_SUCH_FILE) => FetchError::NotFound(remote_path.to_string()),
        _ => FetchError::Protocol(format!("{remote_path}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_such_file_maps_to_not_found() {
        let err = ssh2::Error::from_errno(ErrorCode::SFTP(SFTP_NO_SUCH_FILE));
        assert!(matches!(
            map_sftp_err("/missing.csv", err),
            FetchError::NotFound(_)
        ));
    }

    #[test]
    fn session_errors_map_to_protocol() {
        let err = ssh2::Error::from_errno(ErrorCode::Session(-7));
        assert!(matches!(
            map_sftp_err("/file.csv", err),
            FetchError::Protocol(_)
        ));
    }

    fn file_stat(size: Option<u64>) -> ssh2::FileStat {
        ssh2::FileStat {
            size,
            uid: None,
            gid: None,
            perm: None,
            atime: None,
            mtime: Some(1_700_000_000),
        }
    }

    #[test]
    fn stat_with_size_passes_through() {
        assert_eq!(stat_size("/file.csv", &file_stat(Some(42))).unwrap(), 42);
    }

    #[test]
    fn stat_without_size_is_a_protocol_error() {
        assert!(matches!(
            stat_size("/file.csv", &file_stat(None)),
            Err(FetchError::Protocol(_))
        ));
    }
}
