//! Best-effort bulk caching into LIVE
//!
//! Both passes here tolerate individual failures: each resource is fetched
//! and stored on its own, and a failure only lands in the report.

use crate::cache::NamedCache;
use crate::context::AgentContext;
use crate::error::ShelfResult;
use crate::fetch::{fetch_ok, FetchRequest};
use crate::manifest::AssetManifestDocument;
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Concurrent fetches per pass
const CONCURRENCY: usize = 8;

/// Outcome of a bulk pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    /// Logical paths fetched and stored
    pub fetched: Vec<String>,
    /// Logical paths that could not be fetched or stored
    pub failed: Vec<String>,
    /// Paths skipped because LIVE already had them
    pub already_cached: usize,
    /// Listed optional assets the resource manifest does not know, skipped
    pub unlisted: Vec<String>,
}

impl PrefetchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetch every manifest resource that LIVE does not hold yet
pub async fn prefetch_missing(ctx: &AgentContext) -> ShelfResult<PrefetchReport> {
    let live = ctx.live().await?;
    let present: HashSet<String> = live
        .keys()
        .await?
        .iter()
        .filter_map(|key| ctx.scope.logical_path_of_key(key))
        .collect();

    let missing: Vec<String> = ctx
        .manifest
        .paths()
        .filter(|path| !present.contains(*path))
        .map(str::to_string)
        .collect();

    let already_cached = ctx.manifest.len() - missing.len();
    debug!("{} resources cached, fetching {}", already_cached, missing.len());

    let mut report = fetch_into(ctx, &*live, missing).await;
    report.already_cached = already_cached;
    info!(
        "Offline download finished: {} fetched, {} failed",
        report.fetched.len(),
        report.failed.len()
    );
    Ok(report)
}

/// Fetch the secondary asset manifest and store every asset it lists.
///
/// Only assets the resource manifest lists are cached: anything else would
/// never be served and would be evicted by the next migration.
/// Errors only when the document itself is unavailable or malformed.
pub async fn cache_optional_assets(ctx: &AgentContext) -> ShelfResult<PrefetchReport> {
    let url = ctx.scope.request_url(&ctx.config.lifecycle.assets_manifest)?;
    let response = fetch_ok(&*ctx.fetcher, &FetchRequest::new(url), ctx.timeout()).await?;
    let document = AssetManifestDocument::parse(response.body())?;

    let (listed, unlisted): (Vec<String>, Vec<String>) = document
        .optional_assets()
        .into_iter()
        .partition(|path| ctx.manifest.contains(path));
    for path in &unlisted {
        debug!("Optional asset {} is not in the manifest, skipping", path);
    }

    let live = ctx.live().await?;
    let mut report = fetch_into(ctx, &*live, listed).await;
    report.unlisted = unlisted;
    info!(
        "Optional assets cached: {} fetched, {} failed",
        report.fetched.len(),
        report.failed.len()
    );
    Ok(report)
}

async fn fetch_into(
    ctx: &AgentContext,
    live: &dyn NamedCache,
    paths: Vec<String>,
) -> PrefetchReport {
    let results: Vec<(String, ShelfResult<()>)> = stream::iter(paths)
        .map(|path| async move {
            let outcome = store_one(ctx, live, &path).await;
            (path, outcome)
        })
        .buffer_unordered(CONCURRENCY)
        .collect()
        .await;

    let mut report = PrefetchReport::default();
    for (path, outcome) in results {
        match outcome {
            Ok(()) => report.fetched.push(path),
            Err(e) => {
                warn!("Failed to cache {}: {}", path, e);
                report.failed.push(path);
            }
        }
    }
    report.fetched.sort();
    report.failed.sort();
    report
}

async fn store_one(ctx: &AgentContext, live: &dyn NamedCache, path: &str) -> ShelfResult<()> {
    let url = ctx.scope.request_url(path)?;
    let request = FetchRequest::new(url.clone());
    let response = fetch_ok(&*ctx.fetcher, &request, ctx.timeout()).await?;
    live.put(url.as_str(), response).await
}
