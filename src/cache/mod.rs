//! Named response caches
//!
//! The host provides a set of named, independently addressable stores that
//! map a request identity (the normalized absolute request URL) to a
//! stored response. Two implementations ship with the crate: an in-memory
//! store and a disk store with SHA256-named entry files.
//!
//! # Cache Roles
//!
//! | Role | Written by | Lifetime |
//! |------|------------|----------|
//! | STAGING | install | deleted at end of activation |
//! | LIVE | activation, serving strategies | persists across versions |
//! | MANIFEST-RECORD | activation | overwritten on every activation |

pub mod disk;
pub mod memory;
pub mod names;
pub mod response;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;
pub use names::CacheNames;
pub use response::CachedResponse;

use crate::error::ShelfResult;
use async_trait::async_trait;
use std::sync::Arc;

/// A single named key → response store
#[async_trait]
pub trait NamedCache: Send + Sync {
    /// Name this cache was opened under
    fn name(&self) -> &str;

    /// Look up the response stored for `key`
    async fn get(&self, key: &str) -> ShelfResult<Option<CachedResponse>>;

    /// Store `response` under `key`, replacing any previous entry
    async fn put(&self, key: &str, response: CachedResponse) -> ShelfResult<()>;

    /// Remove the entry for `key`, returning whether it existed
    async fn delete(&self, key: &str) -> ShelfResult<bool>;

    /// All keys currently stored
    async fn keys(&self) -> ShelfResult<Vec<String>>;
}

/// The set of named caches available to the agent
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a cache, creating it if it does not exist
    async fn open(&self, name: &str) -> ShelfResult<Arc<dyn NamedCache>>;

    /// Whether a cache with this name exists
    async fn has(&self, name: &str) -> ShelfResult<bool>;

    /// Delete a whole cache, returning whether it existed
    async fn delete(&self, name: &str) -> ShelfResult<bool>;

    /// Names of all existing caches
    async fn keys(&self) -> ShelfResult<Vec<String>>;
}

/// Copy every entry of `from` into `to`, overwriting. Returns the copied keys.
pub async fn copy_entries(from: &dyn NamedCache, to: &dyn NamedCache) -> ShelfResult<Vec<String>> {
    let keys = from.keys().await?;
    let mut copied = Vec::with_capacity(keys.len());

    for key in keys {
        // Entry may vanish between keys() and get(); skip it
        if let Some(response) = from.get(&key).await? {
            to.put(&key, response).await?;
            copied.push(key);
        }
    }

    Ok(copied)
}
