//! HTTP transport over ureq

use crate::cache::CachedResponse;
use crate::error::{ShelfError, ShelfResult};
use crate::fetch::{CacheMode, FetchRequest, Fetcher};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Largest body the fetcher will buffer (game bundles carry big wasm files)
const MAX_BODY_BYTES: u64 = 256 * 1024 * 1024;

/// Blocking ureq agent driven from tokio's blocking pool
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Option<Duration>) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build();
        Self {
            agent: config.into(),
        }
    }

    fn fetch_blocking(agent: &ureq::Agent, request: &FetchRequest) -> ShelfResult<CachedResponse> {
        let url = request.url.as_str();
        let mut builder = agent.get(url);
        if request.cache_mode == CacheMode::Reload {
            builder = builder
                .header("Cache-Control", "no-cache")
                .header("Pragma", "no-cache");
        }

        let mut response = builder.call().map_err(|e| ShelfError::fetch(url, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()
            .map_err(|e| ShelfError::fetch(url, e))?;

        debug!("{} -> {} ({} bytes)", request, status, body.len());
        Ok(CachedResponse::new(status, body).with_headers(headers))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> ShelfResult<CachedResponse> {
        let agent = self.agent.clone();
        let owned = request.clone();

        tokio::task::spawn_blocking(move || Self::fetch_blocking(&agent, &owned))
            .await
            .map_err(|e| ShelfError::Internal(format!("fetch task panicked: {}", e)))?
    }
}
