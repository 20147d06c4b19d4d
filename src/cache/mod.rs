//! Caching layer
//!
//! Process-local TTL cache for the public read models (content listings,
//! detail views, orientation aggregates).
//!
//! ## Namespaces
//!
//! Every entry lives in the namespace of the content kind it was computed
//! from (`content:<kind>`, `orientation:<kind>`). Writes that change a public
//! aggregate flush the whole namespace instead of tracking individual keys.
//!
//! ## Personalization
//!
//! See [`read_through`]: only anonymous reads are served from or stored in
//! the cache.

pub mod keys;
pub mod read_through;
pub mod store;

pub use keys::{content_namespace, orientation_namespace, CacheKey};
pub use read_through::Viewer;
pub use store::{spawn_cleanup_task, CacheEntry, CacheStats, NamespaceCache};

use std::time::Duration;

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache
    pub max_entries: usize,
    /// TTL applied by read-through
    pub default_ttl: Duration,
    /// Sweeper interval
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl: Duration::from_secs(300),     // 5 minutes
            cleanup_interval: Duration::from_secs(60), // Run cleanup every minute
        }
    }
}

impl CacheConfig {
    pub fn from_args(args: &crate::config::Args) -> Self {
        Self {
            max_entries: args.cache_max_entries,
            default_ttl: Duration::from_secs(args.cache_ttl_secs),
            cleanup_interval: Duration::from_secs(args.cache_cleanup_interval_secs),
        }
    }
}
