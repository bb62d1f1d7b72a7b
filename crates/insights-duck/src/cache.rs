//! TTL cache for execution results

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use insights_expr::ResultSet;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
struct CachedResult {
    result: ResultSet,
    /// Engine time measured when the result was produced
    elapsed: Duration,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedResult {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// Result cache keyed by statement text and row limit.
/// When full, the oldest entry is evicted first.
#[derive(Debug)]
pub struct ResultCache {
    entries: Mutex<HashMap<String, CachedResult>>,
    stats: Mutex<CacheStats>,
    max_entries: usize,
}

impl ResultCache {
    pub const DEFAULT_MAX_ENTRIES: usize = 1000;

    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
            max_entries: max_entries.max(1),
        }
    }

    /// SHA-256 of the SQL text and limit
    pub fn key(sql: &str, limit: Option<u64>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sql.as_bytes());
        hasher.update(b"\0");
        match limit {
            Some(n) => hasher.update(n.to_le_bytes()),
            None => hasher.update(b"none"),
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<(ResultSet, Duration)> {
        let mut entries = lock(&self.entries);
        let mut stats = lock(&self.stats);

        match entries.get(key) {
            Some(cached) if cached.is_expired() => {
                entries.remove(key);
                stats.misses += 1;
                stats.expirations += 1;
                tracing::debug!(key, "Cache entry expired");
                None
            }
            Some(cached) => {
                stats.hits += 1;
                tracing::debug!(key, "Cache hit");
                Some((cached.result.clone(), cached.elapsed))
            }
            None => {
                stats.misses += 1;
                tracing::debug!(key, "Cache miss");
                None
            }
        }
    }

    pub fn put(&self, key: String, result: ResultSet, elapsed: Duration, ttl: Duration) {
        let mut entries = lock(&self.entries);

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, cached)| cached.cached_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                lock(&self.stats).evictions += 1;
                tracing::debug!(key = %oldest, "Evicted cache entry");
            }
        }

        entries.insert(
            key,
            CachedResult {
                result,
                elapsed,
                cached_at: Instant::now(),
                ttl,
            },
        );
        tracing::debug!(size = entries.len(), "Cached result");
    }

    pub fn clear(&self) {
        let mut entries = lock(&self.entries);
        let count = entries.len();
        entries.clear();
        tracing::info!("Cleared {} cache entries", count);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        lock(&self.stats).clone()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ENTRIES)
    }
}

// a panic while holding the lock leaves the map consistent, so keep using it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
