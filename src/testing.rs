//! Test doubles shared by the unit tests

use crate::cache::{CacheStorage, CachedResponse, MemoryStorage, NamedCache};
use crate::context::AgentContext;
use crate::error::{ShelfError, ShelfResult};
use crate::fetch::{FetchRequest, Fetcher};
use crate::host::ClientHost;
use crate::manifest::ResourceManifest;
use crate::router::Scope;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE: &str = "https://game.example/";

/// Build a manifest from `(path, fingerprint)` pairs
pub fn manifest(entries: &[(&str, &str)], core: &[&str]) -> ResourceManifest {
    let resources: BTreeMap<String, String> = entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ResourceManifest::new(resources, core.iter().copied()).unwrap()
}

/// Context over in-memory storage with an empty manifest
pub fn context(fetcher: Arc<StubFetcher>) -> AgentContext {
    context_with(fetcher, manifest(&[], &[]))
}

pub fn context_with(fetcher: Arc<StubFetcher>, manifest: ResourceManifest) -> AgentContext {
    AgentContext::new(Scope::new(BASE).unwrap(), manifest)
        .with_storage(Arc::new(MemoryStorage::new()))
        .with_fetcher(fetcher)
        .with_host(Arc::new(RecordingHost::default()))
}

#[derive(Debug, Clone)]
enum Reply {
    Response(CachedResponse),
    Fail,
}

/// Fetcher answering from a path table and counting calls.
/// Paths are relative to [`BASE`]; `/` is the root document.
#[derive(Debug, Default)]
pub struct StubFetcher {
    routes: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<FetchRequest>>,
    delay: Option<Duration>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, path: &str, body: &'static str) -> Self {
        self.set_body(path, body);
        self
    }

    pub fn with_status(self, path: &str, status: u16) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Reply::Response(CachedResponse::new(status, "")));
        self
    }

    pub fn with_failure(self, path: &str) -> Self {
        self.set_failure(path);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_body(&self, path: &str, body: &'static str) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Reply::Response(CachedResponse::new(200, body)));
    }

    pub fn set_failure(&self, path: &str) {
        self.routes.lock().unwrap().insert(path.to_string(), Reply::Fail);
    }

    pub fn calls_for(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| path_of(r) == path)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn path_of(request: &FetchRequest) -> String {
    let path = request.url.path().trim_start_matches('/');
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: &FetchRequest) -> ShelfResult<CachedResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.routes.lock().unwrap().get(&path_of(request)).cloned();
        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Fail) => {
                Err(ShelfError::fetch(request.url.as_str(), "network unreachable"))
            }
            None => Err(ShelfError::fetch(request.url.as_str(), "no route")),
        }
    }
}

/// Host counting control requests
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub skip_waiting: AtomicUsize,
    pub claims: AtomicUsize,
}

impl RecordingHost {
    pub fn claims(&self) -> usize {
        self.claims.load(Ordering::SeqCst)
    }

    pub fn skips(&self) -> usize {
        self.skip_waiting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientHost for RecordingHost {
    async fn skip_waiting(&self) -> ShelfResult<()> {
        self.skip_waiting.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn claim_clients(&self) -> ShelfResult<()> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Memory storage whose selected caches reject writes
#[derive(Debug, Default)]
pub struct FailingStorage {
    inner: MemoryStorage,
    failing: Mutex<HashSet<String>>,
}

impl FailingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_puts_to(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }
}

#[async_trait]
impl CacheStorage for FailingStorage {
    async fn open(&self, name: &str) -> ShelfResult<Arc<dyn NamedCache>> {
        let cache = self.inner.open(name).await?;
        if self.failing.lock().unwrap().contains(name) {
            return Ok(Arc::new(FailingCache { inner: cache }));
        }
        Ok(cache)
    }

    async fn has(&self, name: &str) -> ShelfResult<bool> {
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> ShelfResult<bool> {
        self.inner.delete(name).await
    }

    async fn keys(&self) -> ShelfResult<Vec<String>> {
        self.inner.keys().await
    }
}

struct FailingCache {
    inner: Arc<dyn NamedCache>,
}

#[async_trait]
impl NamedCache for FailingCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> ShelfResult<Option<CachedResponse>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, _response: CachedResponse) -> ShelfResult<()> {
        Err(ShelfError::cache_write(self.inner.name(), key, "quota exceeded"))
    }

    async fn delete(&self, key: &str) -> ShelfResult<bool> {
        self.inner.delete(key).await
    }

    async fn keys(&self) -> ShelfResult<Vec<String>> {
        self.inner.keys().await
    }
}
