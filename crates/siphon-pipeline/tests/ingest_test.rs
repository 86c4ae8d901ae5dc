//! End-to-end ingest tests: the real scheduler and handler over a local
//! blob store, with an in-memory fetcher that honors the staging contract.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use filetime::FileTime;
use siphon_core::{Config, ServerUrl, SourceList, StorageBackend};
use siphon_fetch::{staging_location, FetchError, FetchResult, ProtocolFetcher};
use siphon_pipeline::{run_ingest, run_ingest_with_handler, EntryHandler};
use siphon_storage::{BlobStore, LocalBlobStore};

/// Serves fixture bytes keyed by remote path, staging them exactly like the
/// real fetchers do.
struct MockFetcher {
    files: HashMap<String, (Vec<u8>, i64)>,
}

#[async_trait]
impl ProtocolFetcher for MockFetcher {
    async fn fetch(
        &self,
        server: &ServerUrl,
        remote_path: &str,
        download_root: &Path,
    ) -> Result<FetchResult, FetchError> {
        let (content, modified_unix) = self
            .files
            .get(remote_path)
            .ok_or_else(|| FetchError::NotFound(remote_path.to_string()))?;

        let location = staging_location(download_root, server, remote_path);
        std::fs::create_dir_all(&location.dir)?;
        let local_path = location.local_path();
        std::fs::write(&local_path, content)?;
        filetime::set_file_mtime(&local_path, FileTime::from_unix_time(*modified_unix, 0))?;

        Ok(FetchResult {
            local_path,
            file_name: location.file_name,
            file_type: location.file_type,
            size: content.len() as u64,
            modified_unix: *modified_unix,
            created_unix: modified_unix + 60,
        })
    }
}

/// Fetcher that never finishes; for timeout coverage.
struct StallingFetcher;

#[async_trait]
impl ProtocolFetcher for StallingFetcher {
    async fn fetch(
        &self,
        _server: &ServerUrl,
        _remote_path: &str,
        _download_root: &Path,
    ) -> Result<FetchResult, FetchError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Err(FetchError::Protocol("unreachable".to_string()))
    }
}

fn test_config(download_root: PathBuf, store_root: &Path, fetch_concurrency: usize) -> Config {
    Config {
        batch_count: 3,
        worker_pool_size: 2,
        fetch_concurrency,
        worker_timeout_secs: 30,
        download_root,
        container: "ingest".to_string(),
        sources_path: "sources.json".into(),
        storage_backend: Some(StorageBackend::Local),
        s3_bucket: None,
        s3_region: None,
        s3_endpoint: None,
        aws_region: None,
        local_store_path: Some(store_root.to_string_lossy().into_owned()),
    }
}

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use zip::write::{FileOptions, ZipWriter};

    let mut buffer = Vec::new();
    {
        let mut writer = ZipWriter::new(std::io::Cursor::new(&mut buffer));
        let timestamp = zip::DateTime::from_date_and_time(2024, 5, 1, 8, 0, 0).unwrap();
        let options = FileOptions::default().last_modified_time(timestamp);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
    buffer
}

fn fixture_fetcher() -> Arc<MockFetcher> {
    let mut files = HashMap::new();
    files.insert(
        "/outgoing/Report 2024.csv".to_string(),
        (b"a,b,c\n1,2,3\n".to_vec(), 1_700_000_000),
    );
    files.insert(
        "/outgoing/bundle.zip".to_string(),
        (
            zip_bytes(&[
                ("inner/first.csv", b"x,y\n" as &[u8]),
                ("second.txt", b"hello"),
            ]),
            1_700_000_100,
        ),
    );
    Arc::new(MockFetcher { files })
}

fn sources_json(raw: &str) -> SourceList {
    serde_json::from_str(raw).unwrap()
}

async fn run_mocked(
    config: &Config,
    store: Arc<dyn BlobStore>,
    sources: &SourceList,
    fetcher: Arc<dyn ProtocolFetcher>,
) -> siphon_pipeline::IngestReport {
    let handler = EntryHandler::with_fetcher(store.clone(), config.download_root.clone(), fetcher);
    run_ingest_with_handler(config, store, handler, sources)
        .await
        .unwrap()
}

/// No files should remain anywhere under the staging root after a run.
fn staged_file_count(root: &Path) -> usize {
    fn walk(dir: &Path, count: &mut usize) {
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, count);
                } else {
                    *count += 1;
                }
            }
        }
    }
    let mut count = 0;
    walk(root, &mut count);
    count
}

#[tokio::test]
async fn ingest_uploads_expands_and_cleans_up() {
    let staging = tempfile::tempdir().unwrap();
    let blobs = tempfile::tempdir().unwrap();
    let config = test_config(staging.path().join("downloads"), blobs.path(), 2);
    let store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(blobs.path(), "ingest"));

    let sources = sources_json(
        r#"{"ftp://alpha.example.com": [
            "/outgoing/Report 2024.csv",
            "/outgoing/bundle.zip",
            "/outgoing/missing.csv"
        ]}"#,
    );

    let report = run_mocked(&config, store.clone(), &sources, fixture_fetcher()).await;

    // One plain file plus two archive members uploaded; the missing remote
    // path is a per-file failure that does not fail its batch.
    assert_eq!(report.totals.uploaded, 3);
    assert_eq!(report.totals.skipped, 0);
    assert_eq!(report.totals.failed, 1);
    assert!(report.batches.iter().all(|b| b.success));

    let stored = store.list_objects("").await.unwrap();
    assert!(stored.contains(&"alpha.example.com_21/csv/Report_2024.csv".to_string()));
    assert!(stored.contains(&"alpha.example.com_21/csv/first.csv".to_string()));
    assert!(stored.contains(&"alpha.example.com_21/txt/second.txt".to_string()));

    // Object metadata carries the remote mtime.
    let meta = store
        .object_meta("alpha.example.com_21/csv/Report_2024.csv")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.modified_unix, 1_700_000_000);

    // Staging area fully reclaimed.
    assert_eq!(staged_file_count(&config.download_root), 0);
}

#[tokio::test]
async fn second_run_skips_everything() {
    let staging = tempfile::tempdir().unwrap();
    let blobs = tempfile::tempdir().unwrap();
    let config = test_config(staging.path().join("downloads"), blobs.path(), 1);
    let store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(blobs.path(), "ingest"));

    let sources =
        sources_json(r#"{"sftp://beta.example.com:2022": ["/outgoing/Report 2024.csv"]}"#);

    let first = run_mocked(&config, store.clone(), &sources, fixture_fetcher()).await;
    assert_eq!(first.totals.uploaded, 1);

    let second = run_mocked(&config, store.clone(), &sources, fixture_fetcher()).await;
    assert_eq!(second.totals.uploaded, 0);
    assert_eq!(second.totals.skipped, 1);
    assert_eq!(second.totals.failed, 0);

    // Still exactly one object.
    let stored = store.list_objects("beta.example.com_2022/").await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn batch_timeout_fails_batch_but_not_run() {
    let staging = tempfile::tempdir().unwrap();
    let blobs = tempfile::tempdir().unwrap();
    let mut config = test_config(staging.path().join("downloads"), blobs.path(), 1);
    config.worker_timeout_secs = 1;
    let store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(blobs.path(), "ingest"));

    let sources = sources_json(r#"{"ftp://slow.example.com": ["/outgoing/big.bin"]}"#);

    let report = run_mocked(&config, store, &sources, Arc::new(StallingFetcher)).await;

    assert_eq!(report.batches.len(), 1);
    assert!(!report.batches[0].success);
    assert_eq!(report.failed_batches(), 1);
}

#[tokio::test]
async fn unsupported_schemes_fail_files_not_batches() {
    // run_ingest proper, without a mock: invalid schemes never reach a
    // protocol client, they surface as per-file failures.
    let staging = tempfile::tempdir().unwrap();
    let blobs = tempfile::tempdir().unwrap();
    let config = test_config(staging.path().join("downloads"), blobs.path(), 2);
    let store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(blobs.path(), "ingest"));

    let sources = sources_json(r#"{"http://not-a-transfer.example.com": ["/a.csv", "/b.csv"]}"#);

    let report = run_ingest(&config, store, &sources).await.unwrap();
    assert_eq!(report.totals.failed, 2);
    assert_eq!(report.totals.uploaded, 0);
    assert!(report.batches.iter().all(|b| b.success));
    assert_eq!(report.failed_batches(), 0);
}
