//! Cache store implementation
//!
//! In-memory TTL cache with namespace invalidation. Values are stored as
//! serialized JSON so one map can hold every read model.

use super::{CacheConfig, CacheKey};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A cached entry with metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Serialized value
    pub data: Vec<u8>,
    /// When this entry was created
    pub created_at: Instant,
    /// When this entry expires
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            data,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Check if this entry has expired
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped by namespace flushes
    pub invalidations: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Process-wide read cache
pub struct NamespaceCache {
    /// storage_key -> entry
    entries: DashMap<String, CacheEntry>,
    /// namespace -> flush count
    generations: DashMap<String, u64>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    evictions: AtomicU64,
}

impl NamespaceCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Get a value; expired or undecodable entries count as misses
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let storage_key = key.to_storage_key();
        if let Some(entry) = self.entries.get(&storage_key) {
            if !entry.is_expired() {
                match serde_json::from_slice(&entry.data) {
                    Ok(value) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        debug!(key = %key, "Cache hit");
                        return Some(value);
                    }
                    Err(e) => warn!(key = %key, error = %e, "Dropping undecodable cache entry"),
                }
            }
            // Release the reference before removing
            drop(entry);
            self.entries.remove(&storage_key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Cache miss");
        None
    }

    /// Store a value with an explicit TTL
    pub fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let data = match serde_json::to_vec(value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %key, error = %e, "Value not cacheable");
                return;
            }
        };
        debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache set");
        self.entries.insert(key.to_storage_key(), CacheEntry::new(data, ttl));

        self.maybe_evict();
    }

    /// Current flush count of a namespace
    pub fn generation(&self, namespace: &str) -> u64 {
        self.generations.get(namespace).map(|g| *g).unwrap_or(0)
    }

    /// Store a value only if its namespace has not been flushed since
    /// `generation` was read. Returns whether the value was stored.
    pub fn set_if_current<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration, generation: u64) -> bool {
        let data = match serde_json::to_vec(value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = %key, error = %e, "Value not cacheable");
                return false;
            }
        };

        // The generation entry stays locked across the insert so a concurrent
        // flush either lands first and is seen here, or sweeps this entry.
        let current = self.generations.entry(key.namespace.clone()).or_insert(0);
        if *current != generation {
            debug!(key = %key, "Namespace flushed during load, not caching");
            return false;
        }
        self.entries.insert(key.to_storage_key(), CacheEntry::new(data, ttl));
        drop(current);

        debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache set");
        self.maybe_evict();
        true
    }

    /// Drop every entry of a namespace
    pub fn invalidate_namespace(&self, namespace: &str) -> usize {
        *self.generations.entry(namespace.to_string()).or_insert(0) += 1;

        let pattern = CacheKey::invalidation_pattern(namespace);
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(&pattern));
        let count = before.saturating_sub(self.entries.len());

        self.invalidations.fetch_add(count as u64, Ordering::Relaxed);
        if count > 0 {
            debug!(namespace = namespace, count = count, "Invalidated cache namespace");
        }
        count
    }

    /// Clear all entries
    pub fn clear(&self) {
        for mut generation in self.generations.iter_mut() {
            *generation += 1;
        }
        self.entries.clear();
        info!("Cache cleared");
    }

    /// Remove expired entries
    pub fn cleanup(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let count = before.saturating_sub(self.entries.len());

        if count > 0 {
            debug!(count = count, "Cleaned up expired cache entries");
        }
        count
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    /// Evict entries if over capacity (oldest first)
    fn maybe_evict(&self) {
        if self.entries.len() <= self.config.max_entries {
            return;
        }

        let to_evict = self.entries.len() - self.config.max_entries;

        let mut entries: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.created_at))
            .collect();

        entries.sort_by_key(|(_, created)| *created);

        for (key, _) in entries.into_iter().take(to_evict) {
            self.entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        debug!(evicted = to_evict, "Evicted cache entries");
    }
}

impl Default for NamespaceCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Spawn a background task that periodically drops expired entries.
/// Abort the returned handle at shutdown.
pub fn spawn_cleanup_task(cache: Arc<NamespaceCache>) -> JoinHandle<()> {
    let interval = cache.config.cleanup_interval;

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.cleanup();
            let stats = cache.stats();
            debug!(
                removed = removed,
                entries = stats.entries,
                hit_rate = format!("{:.1}%", stats.hit_rate()),
                "Cache cleanup completed"
            );
        }
    });

    info!(interval_secs = interval.as_secs(), "Cache cleanup task started");
    handle
}
