//! Staging cleanup.
//!
//! Cleanup is best-effort and never propagates: a file that cannot be
//! removed is logged and left for the next run, it must not turn a
//! successful ingest into a failure.

use std::path::Path;

use tokio::fs;

/// Remove a staged file or extraction directory. Absent paths are a no-op.
pub async fn cleanup_path(path: &Path) {
    let metadata = match fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Cleanup stat failed");
            return;
        }
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };

    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "Staging path removed"),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Cleanup failed");
        }
    }
}
