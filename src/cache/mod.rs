//! Generic cache interface (§6) backing the Tool Server Client's discovery
//! and invocation caches, the Memory Composer's composition cache, and
//! background embedding lookups.
//!
//! Cache keys are opaque strings the caller constructs (e.g. a SHA-256 hash
//! of canonicalized tool arguments, or `conversation:{id}:context`); values
//! are any JSON-serializable type. Reads are lock-free-ish (a short read
//! lock); writes are last-writer-wins, per §5's concurrency model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::{OrchestratorError, Result};

/// Cache performance counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size_bytes: u64,
    pub entry_count: usize,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
    #[serde(default)]
    pub default_ttl: Option<Duration>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_max_size_bytes() -> u64 {
    256 * 1024 * 1024
}

fn default_enabled() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_size_bytes(),
            default_ttl: None,
            enabled: default_enabled(),
        }
    }
}

/// Generic cache of JSON-serializable values, keyed by opaque string (§6).
pub trait Cache: Send + Sync {
    /// Fetch a value, deserializing it into `T`. Returns `Ok(None)` on a
    /// miss; a deserialization failure is treated as a miss (the value was
    /// written by an incompatible caller).
    fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Option<T>>;

    /// Store a value with a TTL in seconds.
    fn set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    fn stats(&self) -> CacheStats;

    fn is_enabled(&self) -> bool;
}

/// Compute a stable cache key from parts, e.g. a tool's `(source, name,
/// canonical-arg-hash)` per §4.3.
pub fn compute_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    format!("{:x}", hasher.finalize())
}

struct CacheEntry {
    value: Value,
    last_accessed: Instant,
    expires_at: Option<Instant>,
    size_bytes: usize,
}

impl CacheEntry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        let now = Instant::now();
        let size_bytes = value.to_string().len();
        Self {
            value,
            last_accessed: now,
            expires_at: ttl.map(|d| now + d),
            size_bytes,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| Instant::now() > exp).unwrap_or(false)
    }

    fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}

/// In-memory LRU+TTL cache, used for all of §6's cache consumers when no
/// external cache backend is configured.
pub struct LruCache {
    cache: RwLock<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    current_size: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LruCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            config,
            current_size: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    fn evict_lru(&self, needed_bytes: usize) {
        let mut cache = self.cache.write();
        let target_size = self.config.max_size_bytes.saturating_sub(needed_bytes as u64);

        while self.current_size.load(Ordering::Relaxed) > target_size && !cache.is_empty() {
            let lru_key = cache
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(key, _)| key.clone());

            match lru_key {
                Some(key) => {
                    if let Some(entry) = cache.remove(&key) {
                        self.current_size.fetch_sub(entry.size_bytes as u64, Ordering::Relaxed);
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                    }
                }
                None => break,
            }
        }
    }

    pub fn cleanup_expired(&self) {
        let mut cache = self.cache.write();
        let expired: Vec<String> = cache
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            if let Some(entry) = cache.remove(&key) {
                self.current_size.fetch_sub(entry.size_bytes as u64, Ordering::Relaxed);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

impl Cache for LruCache {
    fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Option<T>> {
        if !self.config.enabled {
            return Ok(None);
        }

        {
            let cache = self.cache.read();
            match cache.get(key) {
                Some(entry) if !entry.is_expired() => {}
                _ => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
            }
        }

        let mut cache = self.cache.write();
        let Some(entry) = cache.get_mut(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };
        if entry.is_expired() {
            cache.remove(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }
        entry.touch();
        self.hits.fetch_add(1, Ordering::Relaxed);
        let value = serde_json::from_value(entry.value.clone())
            .map_err(|e| OrchestratorError::CacheUnavailable(e.to_string()))?;
        Ok(Some(value))
    }

    fn set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let json = serde_json::to_value(value).map_err(|e| OrchestratorError::CacheUnavailable(e.to_string()))?;
        let ttl = if ttl_seconds == 0 {
            self.config.default_ttl
        } else {
            Some(Duration::from_secs(ttl_seconds))
        };
        let entry = CacheEntry::new(json, ttl);
        let entry_size = entry.size_bytes;

        if self.current_size.load(Ordering::Relaxed) + entry_size as u64 > self.config.max_size_bytes {
            self.evict_lru(entry_size);
        }

        let mut cache = self.cache.write();
        if let Some(old) = cache.remove(key) {
            self.current_size.fetch_sub(old.size_bytes as u64, Ordering::Relaxed);
        }
        self.current_size.fetch_add(entry_size as u64, Ordering::Relaxed);
        cache.insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut cache = self.cache.write();
        if let Some(entry) = cache.remove(key) {
            self.current_size.fetch_sub(entry.size_bytes as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size_bytes: self.current_size.load(Ordering::Relaxed),
            entry_count: self.cache.read().len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

/// No-op cache: every read is a miss. Used when `CacheUnavailable` degraded
/// mode is forced (§7: every external cost is paid, nothing is cached).
#[derive(Debug, Default)]
pub struct NoOpCache;

impl Cache for NoOpCache {
    fn get<T: for<'de> Deserialize<'de>>(&self, _key: &str) -> Result<Option<T>> {
        Ok(None)
    }

    fn set<T: Serialize>(&self, _key: &str, _value: &T, _ttl_seconds: u64) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_and_discriminating() {
        let a = compute_key(&["filesystem", "list_directory", "abc123"]);
        let b = compute_key(&["filesystem", "list_directory", "abc123"]);
        let c = compute_key(&["filesystem", "list_directory", "def456"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn set_and_get_roundtrip() {
        let cache = LruCache::with_defaults();
        cache.set("k", &serde_json::json!({"a": 1}), 60).unwrap();
        let v: Option<serde_json::Value> = cache.get("k").unwrap();
        assert_eq!(v, Some(serde_json::json!({"a": 1})));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn miss_increments_counter() {
        let cache = LruCache::with_defaults();
        let v: Option<serde_json::Value> = cache.get("missing").unwrap();
        assert!(v.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn ttl_expiry() {
        let cache = LruCache::with_defaults();
        cache.set("k", &serde_json::json!("v"), 0).unwrap();
        // ttl_seconds=0 with no default_ttl configured means no expiry;
        // use a sub-second TTL via direct entry construction instead.
        let short = LruCache::new(CacheConfig {
            default_ttl: Some(Duration::from_nanos(1)),
            ..Default::default()
        });
        short.set("k", &serde_json::json!("v"), 0).unwrap();
        std::thread::sleep(Duration::from_millis(1));
        let v: Option<String> = short.get("k").unwrap();
        assert!(v.is_none());
    }

    #[test]
    fn delete_removes_entry() {
        let cache = LruCache::with_defaults();
        cache.set("k", &serde_json::json!("v"), 60).unwrap();
        cache.delete("k").unwrap();
        let v: Option<String> = cache.get("k").unwrap();
        assert!(v.is_none());
    }

    #[test]
    fn noop_cache_never_stores() {
        let cache = NoOpCache;
        cache.set("k", &serde_json::json!("v"), 60).unwrap();
        let v: Option<String> = cache.get("k").unwrap();
        assert!(v.is_none());
        assert!(!cache.is_enabled());
    }
}
