//! Shared key-value cache behind rate limiting, lockout and idempotent create.
//!
//! `MemoryCache` keeps everything in-process and resets on restart;
//! `RedisCache` shares counters across instances.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(value: redis::RedisError) -> Self {
        Self::Backend(value.to_string())
    }
}

/// Counter state after an increment inside a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,
    pub resets_in_secs: u64,
}

#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Increments `key`, starting a fresh window of `window` when absent or expired.
    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, CacheError>;

    /// Reads a counter without touching it.
    async fn peek_window(&self, key: &str) -> Result<Option<WindowCount>, CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Writes between sweeps of expired entries; the sweep interval grows with
/// the map so pruning stays amortised.
const PRUNE_EVERY: usize = 256;

#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<Entries>>,
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, MemoryEntry>,
    writes_since_prune: usize,
}

struct MemoryEntry {
    value: MemoryValue,
    expires_at: Instant,
}

enum MemoryValue {
    Counter(u64),
    Text(String),
}

impl Entries {
    fn note_write(&mut self, now: Instant) {
        self.writes_since_prune += 1;
        if self.writes_since_prune >= PRUNE_EVERY.max(self.map.len() / 2) {
            self.map.retain(|_, entry| entry.expires_at > now);
            self.writes_since_prune = 0;
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.lock().await.map.len()
    }
}

fn remaining_secs(expires_at: Instant, now: Instant) -> u64 {
    let left = expires_at.saturating_duration_since(now);
    left.as_secs() + u64::from(left.subsec_nanos() > 0)
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, CacheError> {
        let mut guard = self.entries.lock().await;
        let now = Instant::now();
        let entry = guard.map.entry(key.to_string()).or_insert_with(|| MemoryEntry {
            value: MemoryValue::Counter(0),
            expires_at: now + window,
        });
        if entry.expires_at <= now || !matches!(entry.value, MemoryValue::Counter(_)) {
            entry.value = MemoryValue::Counter(0);
            entry.expires_at = now + window;
        }
        let count = match &mut entry.value {
            MemoryValue::Counter(count) => {
                *count += 1;
                *count
            }
            MemoryValue::Text(_) => 1,
        };
        let resets_in_secs = remaining_secs(entry.expires_at, now);
        guard.note_write(now);
        Ok(WindowCount {
            count,
            resets_in_secs,
        })
    }

    async fn peek_window(&self, key: &str) -> Result<Option<WindowCount>, CacheError> {
        let guard = self.entries.lock().await;
        let now = Instant::now();
        Ok(guard.map.get(key).and_then(|entry| match entry.value {
            MemoryValue::Counter(count) if entry.expires_at > now => Some(WindowCount {
                count,
                resets_in_secs: remaining_secs(entry.expires_at, now),
            }),
            _ => None,
        }))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let guard = self.entries.lock().await;
        let now = Instant::now();
        Ok(guard.map.get(key).and_then(|entry| match &entry.value {
            MemoryValue::Text(text) if entry.expires_at > now => Some(text.clone()),
            _ => None,
        }))
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut guard = self.entries.lock().await;
        let now = Instant::now();
        guard.map.insert(
            key.to_string(),
            MemoryEntry {
                value: MemoryValue::Text(value),
                expires_at: now + ttl,
            },
        );
        guard.note_write(now);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.map.remove(key);
        Ok(())
    }
}

#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("REDIS_URL")
            .ok()
            .and_then(|url| redis::Client::open(url).ok())
            .map(Self::new)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, CacheError> {
        let mut conn = self.connection().await?;
        let count: u64 = conn.incr(key, 1u64).await?;
        let window_secs = window.as_secs().max(1);
        if count == 1 {
            let _: () = conn.expire(key, window_secs as i64).await?;
        }
        let ttl: i64 = conn.ttl(key).await?;
        let resets_in_secs = if ttl < 0 {
            // Counter lost its expiry (e.g. a crash between INCR and EXPIRE).
            let _: () = conn.expire(key, window_secs as i64).await?;
            window_secs
        } else {
            ttl as u64
        };
        Ok(WindowCount {
            count,
            resets_in_secs,
        })
    }

    async fn peek_window(&self, key: &str) -> Result<Option<WindowCount>, CacheError> {
        let mut conn = self.connection().await?;
        let count: Option<u64> = conn.get(key).await?;
        let Some(count) = count else {
            return Ok(None);
        };
        let ttl: i64 = conn.ttl(key).await?;
        Ok(Some(WindowCount {
            count,
            resets_in_secs: ttl.max(0) as u64,
        }))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn window_counts_up_and_resets_after_expiry() {
        let cache = MemoryCache::new();
        let window = Duration::from_millis(60);
        assert_eq!(cache.incr_window("k", window).await.unwrap().count, 1);
        assert_eq!(cache.incr_window("k", window).await.unwrap().count, 2);
        assert_eq!(cache.peek_window("k").await.unwrap().unwrap().count, 2);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.peek_window("k").await.unwrap().is_none());
        assert_eq!(cache.incr_window("k", window).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn text_values_expire_and_delete() {
        let cache = MemoryCache::new();
        cache
            .set_ex("idem", "{\"ok\":true}".into(), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(cache.get("idem").await.unwrap().as_deref(), Some("{\"ok\":true}"));
        cache.delete("idem").await.unwrap();
        assert!(cache.get("idem").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_counters_are_swept() {
        let cache = MemoryCache::new();
        for n in 0..10_000 {
            cache
                .incr_window(&format!("lockout:203.0.113.{n}"), Duration::from_millis(1))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        for n in 0..10_000 {
            cache
                .incr_window(&format!("ratelimit:{n}"), Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert_eq!(cache.len().await, 10_000);
    }
}
