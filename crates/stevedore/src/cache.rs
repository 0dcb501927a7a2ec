//! Key/value cache contract with TTL support
//!
//! Backs the rate-limit counters and short-lived metric caching. The
//! contract stays provider-neutral: a Redis adapter maps `increment`
//! straight onto INCR + EXPIRE, while [`MemoryCache`] gives tests and the
//! worker scaffold the same semantics in process.

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key/value store with per-entry expiry.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a value, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a value. `None` TTL means the entry never expires.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Check whether a live entry exists for the key.
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove entries whose key matches the pattern, returning the count.
    ///
    /// Patterns support a single `*` wildcard at either end
    /// (`prefix*`, `*suffix`); anything else is an exact match.
    async fn remove_pattern(&self, pattern: &str) -> Result<u64, CacheError>;

    /// Atomically increment a counter, returning the new value.
    ///
    /// The TTL is applied when the counter is created and left untouched on
    /// subsequent increments, so a counter lives for exactly one window
    /// from its first bump.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CacheError>;
}

/// Deserialize a cached JSON value.
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn Cache,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match cache.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Serialize a value to JSON and cache it.
pub async fn set_json<T: Serialize>(
    cache: &dyn Cache,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), CacheError> {
    let bytes = serde_json::to_vec(value)?;
    cache.set(key, bytes, ttl).await
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-memory cache implementation.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Backend("Lock poisoned".into()))
    }

    fn matches(pattern: &str, key: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            key.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            key.ends_with(suffix)
        } else {
            key == pattern
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let entries = self.lock()?;
        let now = Instant::now();
        Ok(entries.get(key).is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn remove_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|key, _| !Self::matches(pattern, key));
        Ok((before - entries.len()) as u64)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
        let mut entries = self.lock()?;
        let now = Instant::now();

        let current = entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| std::str::from_utf8(&entry.value).ok())
            .and_then(|text| text.parse::<u64>().ok())
            .unwrap_or(0);

        let next = current + 1;
        let expires_at = if current == 0 {
            Some(now + ttl)
        } else {
            entries.get(key).and_then(|entry| entry.expires_at)
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_exists() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), None).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert!(cache.exists("k").await.unwrap());
        assert!(!cache.exists("absent").await.unwrap());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("k", b"v".to_vec(), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(cache.exists("k").await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!cache.exists("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_pattern() {
        let cache = MemoryCache::new();
        for key in ["rate:a", "rate:b", "metrics:a"] {
            cache.set(key, b"1".to_vec(), None).await.unwrap();
        }

        let removed = cache.remove_pattern("rate:*").await.unwrap();
        assert_eq!(removed, 2);
        assert!(!cache.exists("rate:a").await.unwrap());
        assert!(cache.exists("metrics:a").await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_counts_and_resets_after_window() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_millis(30);

        assert_eq!(cache.increment("hits", ttl).await.unwrap(), 1);
        assert_eq!(cache.increment("hits", ttl).await.unwrap(), 2);
        assert_eq!(cache.increment("hits", ttl).await.unwrap(), 3);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.increment("hits", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let cache = MemoryCache::new();
        set_json(&cache, "doc", &vec![1u32, 2, 3], None).await.unwrap();

        let value: Option<Vec<u32>> = get_json(&cache, "doc").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
    }
}
