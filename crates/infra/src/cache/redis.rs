//! Redis-backed cache store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::instrument;

use super::{CacheError, CacheKey, CacheResult, CacheStore};

const SCAN_BATCH: usize = 500;

/// Cache store over a shared multiplexed async connection.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: MultiplexedConnection,
}

impl RedisCacheStore {
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url).map_err(store_err)?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(store_err)?;
        Ok(Self { conn })
    }
}

fn store_err(err: redis::RedisError) -> CacheError {
    CacheError::Store(err.to_string())
}

/// `SCAN MATCH` pattern for keys starting with `prefix` taken literally.
fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &CacheKey) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key.as_str())
            .query_async(&mut conn)
            .await
            .map_err(store_err)
    }

    #[instrument(skip(self, value), fields(key = %key))]
    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs().max(1);
        redis::cmd("SET")
            .arg(key.as_str())
            .arg(value)
            .arg("EX")
            .arg(secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(store_err)
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete(&self, keys: &[CacheKey]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(key.as_str());
        }
        cmd.query_async(&mut conn).await.map_err(store_err)
    }

    #[instrument(skip(self))]
    async fn delete_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let mut conn = self.conn.clone();
        let pattern = prefix_pattern(prefix);
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(store_err)?;
            if !keys.is_empty() {
                let deleted: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(store_err)?;
                removed += deleted;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pattern_matches_the_prefix_literally() {
        assert_eq!(prefix_pattern("propdesk:t:1:"), "propdesk:t:1:*");
        assert_eq!(prefix_pattern("pd*[a]?:"), r"pd\*\[a\]\?:*");
        assert_eq!(prefix_pattern(r"a\b"), r"a\\b*");
    }
}
