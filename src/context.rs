//! Worker-wide state
//!
//! Everything the lifecycle controller and the serving strategies share is
//! carried in an [`AgentContext`] instead of ambient globals, so the whole
//! agent can run against in-memory collaborators in tests.

use crate::cache::{CacheNames, CacheStorage, MemoryStorage, NamedCache};
use crate::config::Config;
use crate::error::ShelfResult;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::host::{ClientHost, DetachedHost};
use crate::manifest::ResourceManifest;
use crate::router::{Router, Scope};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Version token used when the registration URL carries none
pub const DEFAULT_VERSION: &str = "v1";

/// Read the version token from the worker's registration URL (`?v=...`)
pub fn registration_version(url: &Url) -> String {
    url.query_pairs()
        .find(|(name, _)| name == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_VERSION.to_string())
}

/// Shared state for one worker version
#[derive(Clone)]
pub struct AgentContext {
    pub config: Arc<Config>,
    pub scope: Arc<Scope>,
    pub manifest: Arc<ResourceManifest>,
    pub version: Option<String>,
    pub names: Arc<CacheNames>,
    pub router: Arc<Router>,
    pub storage: Arc<dyn CacheStorage>,
    pub fetcher: Arc<dyn Fetcher>,
    pub host: Arc<dyn ClientHost>,
}

impl AgentContext {
    /// Context with default config, in-memory storage, HTTP transport and no host
    pub fn new(scope: Scope, manifest: ResourceManifest) -> Self {
        let config = Config::default();
        Self {
            names: Arc::new(CacheNames::new(&config.cache, None)),
            router: Arc::new(Router::new(&config.router)),
            fetcher: Arc::new(HttpFetcher::new(config.network.timeout())),
            config: Arc::new(config),
            scope: Arc::new(scope),
            manifest: Arc::new(manifest),
            version: None,
            storage: Arc::new(MemoryStorage::new()),
            host: Arc::new(DetachedHost),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Arc::new(config);
        self.refresh();
        self
    }

    /// Set the version token (affects cache names when version scoped)
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self.refresh();
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_host(mut self, host: Arc<dyn ClientHost>) -> Self {
        self.host = host;
        self
    }

    fn refresh(&mut self) {
        self.names = Arc::new(CacheNames::new(&self.config.cache, self.version.as_deref()));
        self.router = Arc::new(Router::new(&self.config.router));
    }

    /// Per-fetch timeout from config
    pub fn timeout(&self) -> Option<Duration> {
        self.config.network.timeout()
    }

    pub async fn live(&self) -> ShelfResult<Arc<dyn NamedCache>> {
        self.storage.open(&self.names.live).await
    }

    pub async fn staging(&self) -> ShelfResult<Arc<dyn NamedCache>> {
        self.storage.open(&self.names.staging).await
    }

    pub async fn manifest_record(&self) -> ShelfResult<Arc<dyn NamedCache>> {
        self.storage.open(&self.names.manifest_record).await
    }
}
