//! Cache-aside service.
//!
//! Cache faults are never request faults: store errors and undecodable
//! payloads are logged, counted, and the loader is used instead.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use propdesk_core::TenantId;

use super::{CacheError, CacheKey, CacheStore, KeyMapper};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub errors: u64,
    pub invalidations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    errors: AtomicU64,
    invalidations: AtomicU64,
}

#[derive(Clone)]
pub struct CacheService {
    store: Arc<dyn CacheStore>,
    keys: KeyMapper,
    enabled: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl CacheService {
    pub fn new(store: Arc<dyn CacheStore>, keys: KeyMapper) -> Self {
        Self {
            store,
            keys,
            enabled: Arc::new(AtomicBool::new(true)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn keys(&self) -> &KeyMapper {
        &self.keys
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Cached value for `key`, or `None` on miss, fault or when disabled.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.is_enabled() {
            return None;
        }
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(err) => {
                self.record_error(key, &err);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache hit");
                Some(value)
            }
            Err(err) => {
                self.record_error(key, &CacheError::Serialization(err.to_string()));
                // Drop the undecodable entry so the next read refills it.
                let _ = self.store.delete(std::slice::from_ref(key)).await;
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        if !self.is_enabled() {
            return;
        }
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                self.record_error(key, &CacheError::Serialization(err.to_string()));
                return;
            }
        };
        if let Err(err) = self.store.set(key, raw, ttl).await {
            self.record_error(key, &err);
        }
    }

    /// Read-through: on miss run `loader` and cache a `Some` result.
    /// `None` is returned as-is and not cached. Loader errors propagate.
    pub async fn get_or_load<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return Ok(Some(hit));
        }
        self.counters.loads.fetch_add(1, Ordering::Relaxed);
        let loaded = loader().await?;
        if let Some(value) = &loaded {
            self.set(key, value, ttl).await;
        }
        Ok(loaded)
    }

    /// Remove `keys`. Runs even when disabled so toggling the cache back on
    /// never serves entries written before a change.
    pub async fn invalidate(&self, keys: &[CacheKey]) {
        if keys.is_empty() {
            return;
        }
        match self.store.delete(keys).await {
            Ok(removed) => {
                self.counters
                    .invalidations
                    .fetch_add(keys.len() as u64, Ordering::Relaxed);
                debug!(count = keys.len(), removed, "cache invalidated");
            }
            Err(err) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, count = keys.len(), "cache invalidation failed");
            }
        }
    }

    /// Remove every tenant-scoped entry and the tenant record.
    pub async fn invalidate_tenant(&self, tenant_id: TenantId) {
        let prefix = self.keys.tenant_prefix(tenant_id);
        match self.store.delete_prefix(&prefix).await {
            Ok(removed) => {
                self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
                debug!(tenant_id = %tenant_id, removed, "tenant cache invalidated");
            }
            Err(err) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(tenant_id = %tenant_id, error = %err, "tenant cache invalidation failed");
            }
        }
        self.invalidate(&[self.keys.tenant_record(tenant_id)]).await;
    }

    fn record_error(&self, key: &CacheKey, err: &CacheError) {
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        warn!(key = %key, error = %err, "cache operation failed; falling back to store");
    }
}
