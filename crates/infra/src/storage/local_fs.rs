//! Directory-backed bucket.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument};

use super::{ObjectStorage, StorageError, StorageResult, StoredObject, join_url, validate_key};

/// Sidecar suffix holding an object's content type.
const META_SUFFIX: &str = ".content-type";

/// Objects live under `root` at their key's relative path. Writes go to a
/// temporary sibling first and are renamed into place.
#[derive(Debug, Clone)]
pub struct LocalFsObjectStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalFsObjectStorage {
    pub fn new(root: impl AsRef<Path>, base_url: Option<String>) -> Self {
        let root = root.as_ref().to_path_buf();
        let base_url = base_url.unwrap_or_else(|| format!("file://{}", root.display()));
        Self { root, base_url }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let segments = validate_key(key)?;
        Ok(segments.iter().fold(self.root.clone(), |p, s| p.join(s)))
    }
}

fn meta_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(META_SUFFIX);
    PathBuf::from(os)
}

fn not_found_as(key: &str, err: std::io::Error) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(err)
    }
}

#[async_trait]
impl ObjectStorage for LocalFsObjectStorage {
    #[instrument(skip(self, bytes), fields(size = bytes.len()), err)]
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(format!(".tmp-{}", uuid::Uuid::now_v7()));
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, &bytes).await?;
        if let Err(err) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        fs::write(meta_path(&path), content_type.as_bytes()).await?;
        debug!(path = %path.display(), "object stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<StoredObject> {
        let path = self.path_for(key)?;
        let bytes = fs::read(&path).await.map_err(|e| not_found_as(key, e))?;
        let content_type = match fs::read_to_string(meta_path(&path)).await {
            Ok(ct) => ct,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => "application/octet-stream".to_string(),
            Err(e) => return Err(e.into()),
        };
        Ok(StoredObject { bytes, content_type })
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                let _ = fs::remove_file(meta_path(&path)).await;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        Ok(join_url(&self.base_url, key))
    }
}
