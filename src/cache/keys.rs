//! Cache key definitions
//!
//! Keys are a namespace (one per public aggregate and content kind) plus a
//! fingerprint of the query that produced the value.

use std::fmt;

use crate::db::schemas::ContentKind;

/// Namespace holding listings and detail views of one content kind
pub fn content_namespace(kind: ContentKind) -> String {
    format!("content:{}", kind)
}

/// Namespace holding orientation aggregates of one content kind
pub fn orientation_namespace(kind: ContentKind) -> String {
    format!("orientation:{}", kind)
}

/// Cache key for one read query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Invalidation scope, e.g. `content:post`
    pub namespace: String,
    /// Truncated SHA-256 of the query description
    pub fingerprint: String,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(namespace: &str, query: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            fingerprint: fingerprint(query),
        }
    }

    /// Convert to storage key string
    /// Format: namespace:fingerprint
    pub fn to_storage_key(&self) -> String {
        format!("{}:{}", self.namespace, self.fingerprint)
    }

    /// Prefix matching every key of a namespace
    pub fn invalidation_pattern(namespace: &str) -> String {
        format!("{}:", namespace)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.namespace, self.fingerprint)
    }
}

fn fingerprint(query: &str) -> String {
    if query.is_empty() {
        return "empty".to_string();
    }
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..8]) // First 8 bytes = 16 hex chars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_deterministic() {
        let key1 = CacheKey::new("content:post", "list?page=1&limit=20");
        let key2 = CacheKey::new("content:post", "list?page=1&limit=20");
        assert_eq!(key1, key2);
        assert_eq!(key1.fingerprint.len(), 16);
    }

    #[test]
    fn test_cache_key_distinguishes_queries() {
        let page1 = CacheKey::new("content:post", "list?page=1");
        let page2 = CacheKey::new("content:post", "list?page=2");
        assert_ne!(page1.to_storage_key(), page2.to_storage_key());
    }

    #[test]
    fn test_cache_key_empty_query() {
        let key = CacheKey::new("orientation:short", "");
        assert_eq!(key.to_storage_key(), "orientation:short:empty");
    }

    #[test]
    fn test_namespaces() {
        assert_eq!(content_namespace(ContentKind::Post), "content:post");
        assert_eq!(orientation_namespace(ContentKind::Question), "orientation:question");
        assert_eq!(CacheKey::invalidation_pattern("content:post"), "content:post:");
    }
}
