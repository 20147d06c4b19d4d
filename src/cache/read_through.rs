//! Read-through access for anonymous readers
//!
//! Only anonymous reads go through the cache. A request carrying an actor
//! identity may render personalized fields, so it always loads from the store
//! and never populates the cache.

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use tracing::debug;

use super::{CacheKey, NamespaceCache};
use crate::types::Result;

/// Who is reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    Actor(String),
}

impl Viewer {
    pub fn actor_id(&self) -> Option<&str> {
        match self {
            Viewer::Anonymous => None,
            Viewer::Actor(id) => Some(id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Viewer::Anonymous)
    }
}

impl NamespaceCache {
    /// Serve from cache for anonymous viewers, otherwise load directly.
    /// Load errors are returned and never cached, and a value loaded while
    /// its namespace was flushed is returned but not cached.
    pub async fn read_through<T, F, Fut>(&self, viewer: &Viewer, key: &CacheKey, load: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !viewer.is_anonymous() {
            debug!(key = %key, "Cache bypass for authenticated viewer");
            return load().await;
        }

        if let Some(hit) = self.get::<T>(key) {
            return Ok(hit);
        }

        let generation = self.generation(&key.namespace);
        let value = load().await?;
        self.set_if_current(key, &value, self.default_ttl(), generation);
        Ok(value)
    }
}
