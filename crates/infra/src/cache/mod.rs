//! Read-through cache for hot tenant-scoped entities.
//!
//! - `keys`: the single place cache keys are derived
//! - `store`: the `CacheStore` seam (in-memory, Redis behind `redis` feature)
//! - `service`: `CacheService`, the cache-aside front used by the API

pub mod keys;
#[cfg(feature = "redis")]
pub mod redis;
pub mod service;
pub mod store;

pub use keys::{
    CacheEntity, CacheKey, DEFAULT_PREFIX, KeyMapper, document_filter_scope, document_list_scopes,
};
#[cfg(feature = "redis")]
pub use self::redis::RedisCacheStore;
pub use service::{CacheService, CacheStats};
pub use store::{CacheStore, InMemoryCacheStore};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(String),

    #[error("cache serialization error: {0}")]
    Serialization(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
