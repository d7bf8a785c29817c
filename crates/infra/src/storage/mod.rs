//! Object storage (the document bucket).
//!
//! Keys are relative, `/`-separated paths such as
//! `tenants/{tenant}/documents/{document}/{file}`. Backends must reject keys
//! that could escape their namespace.

use async_trait::async_trait;
use thiserror::Error;

pub mod local_fs;
pub mod memory;

pub use local_fs::LocalFsObjectStorage;
pub use memory::InMemoryObjectStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<()>;
    async fn get(&self, key: &str) -> StorageResult<StoredObject>;
    /// Returns whether an object was removed.
    async fn delete(&self, key: &str) -> StorageResult<bool>;
    /// Public or internal URL for `key`.
    fn url(&self, key: &str) -> StorageResult<String>;
}

/// Reject empty, absolute and traversing keys. Returns the key's segments.
pub fn validate_key(key: &str) -> StorageResult<Vec<&str>> {
    if key.is_empty() || key.starts_with('/') || key.starts_with('\\') || key.contains('\0') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    let segments: Vec<&str> = key.split('/').collect();
    let bad = segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\') || s.contains(':'));
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(segments)
}

pub(crate) fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}
