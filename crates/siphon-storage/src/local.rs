use crate::traits::{BlobStore, ObjectMeta, StoreError, StoreResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const META_SUFFIX: &str = ".meta.json";

/// Local filesystem blob store.
///
/// Objects live under `{root}/{container}/{blob_path}`; metadata is kept in
/// a `.meta.json` sidecar next to each object.
#[derive(Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    container: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        LocalBlobStore {
            root: root.into(),
            container: container.into(),
        }
    }

    fn container_dir(&self) -> PathBuf {
        self.root.join(&self.container)
    }

    /// Convert a blob path to a filesystem path with traversal validation.
    fn blob_to_path(&self, blob_path: &str) -> StoreResult<PathBuf> {
        if blob_path.is_empty()
            || blob_path.starts_with('/')
            || blob_path.split('/').any(|segment| segment == "..")
        {
            return Err(StoreError::InvalidPath(blob_path.to_string()));
        }
        Ok(self.container_dir().join(blob_path))
    }

    fn meta_path(object_path: &Path) -> PathBuf {
        let mut name = object_path.as_os_str().to_os_string();
        name.push(META_SUFFIX);
        PathBuf::from(name)
    }

    async fn ensure_parent_dir(path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn ensure_container(&self) -> StoreResult<()> {
        let dir = self.container_dir();
        fs::create_dir_all(&dir).await.map_err(|e| {
            StoreError::ConfigError(format!(
                "Failed to create container directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(())
    }

    async fn put_object(
        &self,
        blob_path: &str,
        data: Vec<u8>,
        meta: &ObjectMeta,
    ) -> StoreResult<()> {
        let path = self.blob_to_path(blob_path)?;
        let size = data.len();

        Self::ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StoreError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;
        file.write_all(&data).await.map_err(|e| {
            StoreError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;
        file.sync_all().await.map_err(|e| {
            StoreError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        let sidecar = serde_json::to_vec(meta)
            .map_err(|e| StoreError::UploadFailed(format!("Failed to encode metadata: {}", e)))?;
        fs::write(Self::meta_path(&path), sidecar).await.map_err(|e| {
            StoreError::UploadFailed(format!(
                "Failed to write metadata for {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::info!(
            path = %path.display(),
            blob_path = %blob_path,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local store put successful"
        );

        Ok(())
    }

    async fn object_meta(&self, blob_path: &str) -> StoreResult<Option<ObjectMeta>> {
        let path = self.blob_to_path(blob_path)?;

        let fs_meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::from(e)),
        };

        let meta_path = Self::meta_path(&path);
        match fs::read(&meta_path).await {
            Ok(raw) => {
                let meta: ObjectMeta = serde_json::from_slice(&raw).map_err(|e| {
                    StoreError::BackendError(format!(
                        "Corrupt metadata sidecar {}: {}",
                        meta_path.display(),
                        e
                    ))
                })?;
                // The sidecar keeps the timestamps; the size is always the
                // actual byte count on disk, so integrity checks see what
                // was really stored.
                Ok(Some(ObjectMeta {
                    size: fs_meta.len(),
                    ..meta
                }))
            }
            // Object without a sidecar: fall back to filesystem metadata.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let modified = fs_meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
                Ok(Some(ObjectMeta {
                    size: fs_meta.len(),
                    modified_unix: modified,
                    created_unix: modified,
                }))
            }
            Err(e) => Err(StoreError::from(e)),
        }
    }

    async fn list_objects(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let dir = self.container_dir();
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        collect_files(&dir, &dir, &mut paths)?;
        paths.retain(|p| p.starts_with(prefix) && !p.ends_with(META_SUFFIX));
        paths.sort();
        Ok(paths)
    }
}

/// Walk `dir` recursively, pushing container-relative paths with `/`
/// separators.
fn collect_files(base: &Path, dir: &Path, out: &mut Vec<String>) -> StoreResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(base, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(base) {
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(rel);
        }
    }
    Ok(())
}
