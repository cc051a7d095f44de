//! Install step: stage the application shell

use crate::context::AgentContext;
use crate::error::{ShelfError, ShelfResult};
use crate::fetch::{fetch_ok, FetchRequest};
use futures_util::future::try_join_all;
use tracing::{debug, info};

/// Fetch every core asset (bypassing HTTP caches) and write them into
/// STAGING. Nothing is written unless every fetch succeeds.
///
/// Returns the staged cache keys.
pub async fn populate_staging(ctx: &AgentContext) -> ShelfResult<Vec<String>> {
    let requests = ctx
        .manifest
        .core()
        .iter()
        .map(|path| ctx.scope.request_url(path).map(FetchRequest::reload))
        .collect::<ShelfResult<Vec<_>>>()?;

    let timeout = ctx.timeout();
    let responses = try_join_all(
        requests
            .iter()
            .map(|request| fetch_ok(&*ctx.fetcher, request, timeout)),
    )
    .await
    .map_err(|e| ShelfError::Install(format!("core asset unavailable: {}", e)))?;

    let staging = ctx
        .staging()
        .await
        .map_err(|e| ShelfError::Install(e.to_string()))?;

    let mut staged = Vec::with_capacity(responses.len());
    for (request, response) in requests.iter().zip(responses) {
        let key = request.url.to_string();
        staging
            .put(&key, response)
            .await
            .map_err(|e| ShelfError::Install(e.to_string()))?;
        debug!("Staged {}", key);
        staged.push(key);
    }

    info!("Staged {} core assets", staged.len());
    Ok(staged)
}
