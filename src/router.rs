//! Request classification
//!
//! Maps an intercepted request to a logical manifest path and picks the
//! serving strategy for it. Anything the agent should not touch is passed
//! through to the network untouched.

use crate::config::RouterConfig;
use crate::error::{ShelfError, ShelfResult};
use crate::manifest::ResourceManifest;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;
use url::Url;

/// Logical path of the top-level document
pub const ROOT_PATH: &str = "/";

/// The origin (and base path) the worker controls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    base: Url,
}

impl Scope {
    /// Parse a scope such as `https://game.example/` or `https://host/app/`
    pub fn new(base: &str) -> ShelfResult<Self> {
        let mut url = Url::parse(base)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ShelfError::InvalidScope {
                scope: base.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }
        url.set_query(None);
        url.set_fragment(None);
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self { base: url })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for a logical path
    pub fn request_url(&self, path: &str) -> ShelfResult<Url> {
        if path == ROOT_PATH {
            return Ok(self.base.clone());
        }
        Ok(self.base.join(path)?)
    }

    /// Cache key (request identity) for a logical path
    pub fn cache_key(&self, path: &str) -> ShelfResult<String> {
        Ok(self.request_url(path)?.to_string())
    }

    /// Logical path of an absolute URL, or `None` when it is outside the scope
    pub fn logical_path(&self, url: &Url) -> Option<String> {
        if url.origin() != self.base.origin() {
            return None;
        }
        let rest = url.path().strip_prefix(self.base.path())?;

        let mut path = if rest.is_empty() {
            ROOT_PATH.to_string()
        } else {
            rest.to_string()
        };
        if let Some(query) = url.query().filter(|q| !q.is_empty()) {
            path.push('?');
            path.push_str(query);
        }
        Some(path)
    }

    /// Logical path of a stored cache key
    pub fn logical_path_of_key(&self, key: &str) -> Option<String> {
        Url::parse(key).ok().and_then(|url| self.logical_path(&url))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)
    }
}

/// A request seen by the worker's fetch interception
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub method: String,
    pub url: Url,
}

impl InterceptedRequest {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self {
            method: method.into(),
            url,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    /// Plain retrieval (the only kind the agent serves)
    pub fn is_retrieval(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// Serving strategy for a routed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Serve from LIVE, populate it lazily on miss
    CacheFirst,
    /// Prefer the network, fall back to LIVE
    NetworkFirst,
    /// Serve from LIVE and refresh it in the background
    StaleWhileRevalidate,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CacheFirst => "cache-first",
            Self::NetworkFirst => "network-first",
            Self::StaleWhileRevalidate => "stale-while-revalidate",
        };
        write!(f, "{}", name)
    }
}

/// Why the agent declined to intervene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Passthrough {
    /// Worker has not finished activating
    Inactive,
    /// Not a plain retrieval
    Method,
    /// Outside the worker's origin or base path
    OutOfScope,
    /// Not listed in the manifest
    Unlisted,
}

/// Outcome of classifying a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Passthrough(Passthrough),
    Serve {
        /// Logical manifest path
        path: String,
        /// Normalized request identity used as the cache key
        key: Url,
        strategy: Strategy,
    },
}

/// Classifies intercepted requests
#[derive(Debug, Clone)]
pub struct Router {
    cache_bust_param: String,
    revalidate_extensions: HashSet<String>,
}

impl Router {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            cache_bust_param: config.cache_bust_param.clone(),
            revalidate_extensions: config
                .revalidate_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Drop the fragment and the cache-busting parameter.
    ///
    /// Remaining query segments are kept byte for byte, so keys stay equal
    /// to the URLs the page actually requests.
    pub fn normalize(&self, url: &Url) -> Url {
        let mut normalized = url.clone();
        normalized.set_fragment(None);

        if let Some(query) = url.query() {
            let kept: Vec<&str> = query
                .split('&')
                .filter(|segment| {
                    let name = segment.split_once('=').map_or(*segment, |(name, _)| name);
                    name != self.cache_bust_param
                })
                .collect();

            if kept.is_empty() {
                normalized.set_query(None);
            } else {
                normalized.set_query(Some(&kept.join("&")));
            }
        }
        normalized
    }

    /// Pick the strategy for a manifest-listed path
    pub fn strategy_for(&self, path: &str) -> Strategy {
        if path == ROOT_PATH {
            return Strategy::NetworkFirst;
        }

        let without_query = path.split('?').next().unwrap_or(path);
        let file_name = without_query.rsplit('/').next().unwrap_or(without_query);
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match extension {
            Some(ext) if self.revalidate_extensions.contains(&ext) => {
                Strategy::StaleWhileRevalidate
            }
            _ => Strategy::CacheFirst,
        }
    }

    /// Classify a request against the scope and manifest
    pub fn classify(
        &self,
        scope: &Scope,
        manifest: &ResourceManifest,
        request: &InterceptedRequest,
    ) -> Route {
        if !request.is_retrieval() {
            return Route::Passthrough(Passthrough::Method);
        }

        let key = self.normalize(&request.url);
        let Some(path) = scope.logical_path(&key) else {
            return Route::Passthrough(Passthrough::OutOfScope);
        };

        if !manifest.contains(&path) {
            debug!("{} not in manifest, passing through", path);
            return Route::Passthrough(Passthrough::Unlisted);
        }

        let strategy = self.strategy_for(&path);
        debug!("{} -> {}", path, strategy);
        Route::Serve {
            path,
            key,
            strategy,
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(&RouterConfig::default())
    }
}
