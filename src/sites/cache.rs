//! Process-lifetime metadata cache.
//!
//! Keyed by the exact query or id string. Entries never expire; a restart is
//! the only refresh. Concurrent misses on the same key may both fetch, and
//! the later insert wins. Stream URLs must never go in here.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::error::Result;

#[derive(Debug)]
pub struct MetadataCache<V> {
    entries: DashMap<String, Arc<V>>,
}

impl<V> Default for MetadataCache<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V> MetadataCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn insert(&self, key: impl Into<String>, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries.insert(key.into(), Arc::clone(&value));
        value
    }

    /// Cached value for `key`, or the result of `fetch` (stored on success).
    /// Errors are not cached.
    pub async fn get_or_try_insert_with<F, Fut>(&self, key: &str, fetch: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(hit) = self.get(key) {
            debug!(key, "Metadata cache hit");
            return Ok(hit);
        }
        let value = fetch().await?;
        Ok(self.insert(key, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn second_lookup_does_not_fetch() {
        let cache = MetadataCache::new();
        let fetches = AtomicUsize::new(0);
        for _ in 0..2 {
            let value = cache
                .get_or_try_insert_with("x", || async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok("first".to_string())
                })
                .await
                .unwrap();
            assert_eq!(*value, "first");
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache: MetadataCache<String> = MetadataCache::new();
        let err = cache
            .get_or_try_insert_with("x", || async { Err(ProviderError::NoSources) })
            .await;
        assert!(err.is_err());
        assert!(cache.is_empty());

        let ok = cache
            .get_or_try_insert_with("x", || async { Ok("later".to_string()) })
            .await
            .unwrap();
        assert_eq!(*ok, "later");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn keys_are_exact() {
        let cache = MetadataCache::new();
        cache.insert("Inception", 1);
        assert!(cache.get("inception").is_none());
        assert_eq!(cache.get("Inception").as_deref(), Some(&1));
    }
}
