//! Network access
//!
//! The agent never talks to a transport directly; it goes through a
//! [`Fetcher`]. Transport failures are errors, any HTTP status is a
//! response, so each strategy decides what a non-2xx means for it.

pub mod http;

pub use http::HttpFetcher;

use crate::cache::CachedResponse;
use crate::error::{ShelfError, ShelfResult};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use url::Url;

/// How intermediate HTTP caches should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Normal fetch
    #[default]
    Default,
    /// Force a fresh network read, bypassing intermediate caches
    Reload,
}

/// An outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    pub cache_mode: CacheMode,
}

impl FetchRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            cache_mode: CacheMode::Default,
        }
    }

    /// Request that bypasses intermediate caches
    pub fn reload(url: Url) -> Self {
        Self {
            url,
            cache_mode: CacheMode::Reload,
        }
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cache_mode {
            CacheMode::Default => write!(f, "GET {}", self.url),
            CacheMode::Reload => write!(f, "GET {} (reload)", self.url),
        }
    }
}

/// Network transport abstraction
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request. Non-2xx statuses are `Ok`.
    async fn fetch(&self, request: &FetchRequest) -> ShelfResult<CachedResponse>;
}

/// Fetch with an optional deadline
pub async fn fetch_with_timeout(
    fetcher: &dyn Fetcher,
    request: &FetchRequest,
    timeout: Option<Duration>,
) -> ShelfResult<CachedResponse> {
    match timeout {
        None => fetcher.fetch(request).await,
        Some(after) => tokio::time::timeout(after, fetcher.fetch(request))
            .await
            .map_err(|_| ShelfError::FetchTimeout {
                url: request.url.to_string(),
                after,
            })?,
    }
}

/// Fetch and treat anything but 2xx as a failure
pub async fn fetch_ok(
    fetcher: &dyn Fetcher,
    request: &FetchRequest,
    timeout: Option<Duration>,
) -> ShelfResult<CachedResponse> {
    let response = fetch_with_timeout(fetcher, request, timeout).await?;
    if response.is_ok() {
        Ok(response)
    } else {
        Err(ShelfError::FetchStatus {
            url: request.url.to_string(),
            status: response.status(),
        })
    }
}
