//! Serving strategies
//!
//! All three serve out of the LIVE cache. A failing cache write never
//! stops a fetched response from reaching the caller; it is logged and
//! the response is returned as if the write had succeeded.

use crate::cache::{CachedResponse, NamedCache};
use crate::context::AgentContext;
use crate::error::ShelfResult;
use crate::fetch::{fetch_with_timeout, FetchRequest};
use crate::router::Strategy;
use crate::task::BackgroundTask;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Where a served response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
}

/// A response produced by a strategy
#[derive(Debug)]
pub struct Served {
    pub response: CachedResponse,
    pub source: ResponseSource,
    /// Background refresh started by stale-while-revalidate
    pub revalidation: Option<BackgroundTask>,
}

impl Served {
    fn cached(response: CachedResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Cache,
            revalidation: None,
        }
    }

    fn network(response: CachedResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
            revalidation: None,
        }
    }
}

/// Run `strategy` for the request identified by `key`
pub async fn serve(ctx: &AgentContext, strategy: Strategy, key: &Url) -> ShelfResult<Served> {
    match strategy {
        Strategy::CacheFirst => cache_first(ctx, key).await,
        Strategy::NetworkFirst => network_first(ctx, key).await,
        Strategy::StaleWhileRevalidate => stale_while_revalidate(ctx, key).await,
    }
}

/// Serve the cached entry; on a miss fetch it and store it if 2xx.
/// Existing entries are never refreshed here.
pub async fn cache_first(ctx: &AgentContext, key: &Url) -> ShelfResult<Served> {
    let live = open_live(ctx).await;
    if let Some(cached) = lookup(live.as_deref(), key).await {
        return Ok(Served::cached(cached));
    }

    let response = fetch_key(ctx, key).await?;
    if response.is_ok() {
        store(live.as_deref(), key, &response).await;
    }
    Ok(Served::network(response))
}

/// Prefer the network; fall back to the cached entry on failure.
///
/// A non-2xx answer counts as a failure for fallback purposes, but with
/// nothing cached it is returned unchanged, just as the network gave it.
pub async fn network_first(ctx: &AgentContext, key: &Url) -> ShelfResult<Served> {
    let live = open_live(ctx).await;
    let outcome = fetch_key(ctx, key).await;

    if let Ok(response) = &outcome {
        if response.is_ok() {
            store(live.as_deref(), key, response).await;
            return outcome.map(Served::network);
        }
    }

    if let Some(cached) = lookup(live.as_deref(), key).await {
        match &outcome {
            Ok(response) => debug!("{} answered {}, serving cached copy", key, response.status()),
            Err(e) => debug!("{} unreachable ({}), serving cached copy", key, e),
        }
        return Ok(Served::cached(cached));
    }

    outcome.map(Served::network)
}

/// Serve the cached entry immediately and refresh it in the background.
/// Without a cached entry the caller waits for the refresh instead.
pub async fn stale_while_revalidate(ctx: &AgentContext, key: &Url) -> ShelfResult<Served> {
    let live = open_live(ctx).await;

    match lookup(live.as_deref(), key).await {
        Some(cached) => {
            let bg_ctx = ctx.clone();
            let bg_key = key.clone();
            let task = BackgroundTask::spawn(format!("revalidate {}", key), async move {
                if let Err(e) = revalidate(&bg_ctx, &bg_key).await {
                    debug!("Revalidation of {} failed: {}", bg_key, e);
                }
            });

            Ok(Served {
                response: cached,
                source: ResponseSource::Cache,
                revalidation: Some(task),
            })
        }
        None => revalidate(ctx, key).await.map(Served::network),
    }
}

async fn fetch_key(ctx: &AgentContext, key: &Url) -> ShelfResult<CachedResponse> {
    fetch_with_timeout(&*ctx.fetcher, &FetchRequest::new(key.clone()), ctx.timeout()).await
}

/// Fetch `key` and overwrite the LIVE entry when the answer is 2xx
async fn revalidate(ctx: &AgentContext, key: &Url) -> ShelfResult<CachedResponse> {
    let response = fetch_key(ctx, key).await?;
    if response.is_ok() {
        let live = open_live(ctx).await;
        store(live.as_deref(), key, &response).await;
    }
    Ok(response)
}

async fn open_live(ctx: &AgentContext) -> Option<Arc<dyn NamedCache>> {
    match ctx.live().await {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("Live cache unavailable, serving from network: {}", e);
            None
        }
    }
}

async fn lookup(cache: Option<&dyn NamedCache>, key: &Url) -> Option<CachedResponse> {
    let cache = cache?;
    match cache.get(key.as_str()).await {
        Ok(found) => found,
        Err(e) => {
            warn!("Cache lookup for {} failed: {}", key, e);
            None
        }
    }
}

async fn store(cache: Option<&dyn NamedCache>, key: &Url, response: &CachedResponse) {
    let Some(cache) = cache else {
        return;
    };
    if let Err(e) = cache.put(key.as_str(), response.clone()).await {
        warn!("Failed to cache {}: {}", key, e);
    }
}
