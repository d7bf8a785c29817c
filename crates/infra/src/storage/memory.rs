use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{ObjectStorage, StorageError, StorageResult, StoredObject, join_url, validate_key};

/// Bucket held in process memory (dev/test).
#[derive(Debug)]
pub struct InMemoryObjectStorage {
    objects: RwLock<HashMap<String, StoredObject>>,
    base_url: String,
}

impl Default for InMemoryObjectStorage {
    fn default() -> Self {
        Self::new("memory://propdesk")
    }
}

impl InMemoryObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            base_url: base_url.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .read()
            .map(|o| o.contains_key(key))
            .unwrap_or(false)
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Io(std::io::Error::other("object map lock poisoned"))
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<()> {
        validate_key(key)?;
        let mut objects = self.objects.write().map_err(poisoned)?;
        objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<StoredObject> {
        validate_key(key)?;
        let objects = self.objects.read().map_err(poisoned)?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let mut objects = self.objects.write().map_err(poisoned)?;
        Ok(objects.remove(key).is_some())
    }

    fn url(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        Ok(join_url(&self.base_url, key))
    }
}
