//! In-memory cache storage

use crate::cache::{CacheStorage, CachedResponse, NamedCache};
use crate::error::ShelfResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local storage. Deleting a cache detaches it: handles opened
/// earlier keep working but are no longer reachable through `open`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    caches: Arc<RwLock<BTreeMap<String, Arc<MemoryCache>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> ShelfResult<Arc<dyn NamedCache>> {
        let mut caches = self.caches.write().await;
        let cache = caches
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCache::new(name)))
            .clone();
        Ok(cache)
    }

    async fn has(&self, name: &str) -> ShelfResult<bool> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn delete(&self, name: &str) -> ShelfResult<bool> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn keys(&self) -> ShelfResult<Vec<String>> {
        Ok(self.caches.read().await.keys().cloned().collect())
    }
}

/// One in-memory named cache
#[derive(Debug)]
pub struct MemoryCache {
    name: String,
    entries: RwLock<BTreeMap<String, CachedResponse>>,
}

impl MemoryCache {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl NamedCache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> ShelfResult<Option<CachedResponse>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, response: CachedResponse) -> ShelfResult<()> {
        self.entries.write().await.insert(key.to_string(), response);
        Ok(())
    }

    async fn delete(&self, key: &str) -> ShelfResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> ShelfResult<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}
