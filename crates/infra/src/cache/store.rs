//! Cache storage backends.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{CacheError, CacheKey, CacheResult};

/// Raw string storage with per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<String>>;
    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> CacheResult<()>;
    /// Returns the number of keys removed.
    async fn delete(&self, keys: &[CacheKey]) -> CacheResult<u64>;
    /// Removes every key starting with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local cache store.
///
/// Expired entries count as misses and are dropped on access. With a
/// capacity set, inserting into a full store first purges expired entries,
/// then evicts the entry closest to expiry.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
    capacity: Option<usize>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: Some(capacity.max(1)),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|entries| entries.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> CacheError {
    CacheError::Store("in-memory cache lock poisoned".to_string())
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().map_err(poisoned)?;
            match entries.get(key.as_str()) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }
        let mut entries = self.entries.write().map_err(poisoned)?;
        if entries
            .get(key.as_str())
            .is_some_and(|entry| entry.expires_at <= now)
        {
            entries.remove(key.as_str());
        }
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> CacheResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(poisoned)?;
        if let Some(capacity) = self.capacity {
            if !entries.contains_key(key.as_str()) && entries.len() >= capacity {
                entries.retain(|_, e| e.expires_at > now);
                if entries.len() >= capacity {
                    let victim = entries
                        .iter()
                        .min_by_key(|(_, e)| e.expires_at)
                        .map(|(k, _)| k.clone());
                    if let Some(victim) = victim {
                        entries.remove(&victim);
                    }
                }
            }
        }
        entries.insert(
            key.as_str().to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[CacheKey]) -> CacheResult<u64> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let removed = keys
            .iter()
            .filter(|k| entries.remove(k.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}
