//! Page control surface provided by the host environment

use crate::error::ShelfResult;
use async_trait::async_trait;
use tracing::info;

/// Operations on the pages (clients) the worker controls
#[async_trait]
pub trait ClientHost: Send + Sync {
    /// Skip the grace period that waits for older-version pages to close
    async fn skip_waiting(&self) -> ShelfResult<()>;

    /// Take control of already-open pages without a reload
    async fn claim_clients(&self) -> ShelfResult<()>;
}

/// Host that has no pages to control; only logs the requests
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedHost;

#[async_trait]
impl ClientHost for DetachedHost {
    async fn skip_waiting(&self) -> ShelfResult<()> {
        info!("skip_waiting requested (no host attached)");
        Ok(())
    }

    async fn claim_clients(&self) -> ShelfResult<()> {
        info!("claim_clients requested (no host attached)");
        Ok(())
    }
}
