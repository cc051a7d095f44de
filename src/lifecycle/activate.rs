//! Activate step: manifest diff and cache migration
//!
//! 1. Read the previous manifest from MANIFEST-RECORD. If there is none,
//!    LIVE is dropped and rebuilt from STAGING alone.
//! 2. Otherwise every LIVE entry whose fingerprint is unchanged is kept
//!    and everything else is evicted. When the previous generation lived
//!    in a differently named LIVE cache (version-scoped names), its
//!    unchanged entries are copied across first.
//! 3. STAGING is copied over LIVE, then deleted.
//! 4. The current manifest is written to MANIFEST-RECORD.
//! 5. Caches left behind by other versions of this agent are reclaimed.

use crate::cache::{copy_entries, CacheNames, NamedCache};
use crate::context::AgentContext;
use crate::error::ShelfResult;
use crate::manifest::{ManifestRecord, RECORD_KEY};
use tracing::{debug, info, warn};

/// What a successful migration did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// No usable record existed; LIVE was rebuilt from STAGING
    pub clean_slate: bool,
    /// Logical paths kept from the previous generation
    pub reused: Vec<String>,
    /// Cache keys removed from LIVE
    pub evicted: Vec<String>,
    /// Cache keys copied from STAGING
    pub staged: Vec<String>,
    /// Foreign caches deleted
    pub reclaimed: Vec<String>,
}

/// Migrate STAGING into LIVE. Any error leaves the caches in an unknown
/// state; the caller is expected to [`teardown`].
pub async fn migrate(ctx: &AgentContext, version: Option<String>) -> ShelfResult<MigrationReport> {
    let names = &ctx.names;
    let record_cache = ctx.manifest_record().await?;
    let mut report = MigrationReport::default();

    let live = match record_cache.get(RECORD_KEY).await? {
        None => {
            info!("No manifest record, rebuilding {} from staging", names.live);
            ctx.storage.delete(&names.live).await?;
            report.clean_slate = true;
            ctx.live().await?
        }
        Some(stored) => {
            let previous = ManifestRecord::from_response(&stored)?;
            let live = ctx.live().await?;
            carry_over(ctx, &previous, &*live).await?;

            for key in live.keys().await? {
                let reusable = ctx
                    .scope
                    .logical_path_of_key(&key)
                    .filter(|path| ctx.manifest.is_reusable(path, &previous.resources));

                match reusable {
                    Some(path) => report.reused.push(path),
                    None => {
                        live.delete(&key).await?;
                        debug!("Evicted {}", key);
                        report.evicted.push(key);
                    }
                }
            }
            live
        }
    };

    let staging = ctx.staging().await?;
    report.staged = copy_entries(&*staging, &*live).await?;
    ctx.storage.delete(&names.staging).await?;

    let record = ManifestRecord::capture(&ctx.manifest, version, &names.live);
    record_cache.put(RECORD_KEY, record.to_response()?).await?;

    if ctx.config.cache.reclaim_foreign {
        report.reclaimed = reclaim_foreign(ctx).await?;
    }

    info!(
        "Migrated {}: {} reused, {} evicted, {} staged",
        names.live,
        report.reused.len(),
        report.evicted.len(),
        report.staged.len()
    );
    Ok(report)
}

/// Copy reusable entries from the previous generation's LIVE cache when it
/// is not the current one. Entries already present in `live` are left alone.
async fn carry_over(
    ctx: &AgentContext,
    previous: &ManifestRecord,
    live: &dyn NamedCache,
) -> ShelfResult<usize> {
    let previous_live = previous.live_cache.clone().unwrap_or_else(|| {
        CacheNames::new(&ctx.config.cache, previous.version.as_deref()).live
    });
    if previous_live == ctx.names.live || !ctx.storage.has(&previous_live).await? {
        return Ok(0);
    }

    let source = ctx.storage.open(&previous_live).await?;
    let present = live.keys().await?;
    let mut copied = 0;
    for key in source.keys().await? {
        if present.contains(&key) {
            continue;
        }
        let reusable = ctx
            .scope
            .logical_path_of_key(&key)
            .is_some_and(|path| ctx.manifest.is_reusable(&path, &previous.resources));
        if !reusable {
            continue;
        }
        if let Some(response) = source.get(&key).await? {
            live.put(&key, response).await?;
            copied += 1;
        }
    }

    info!("Carried {} entries over from {}", copied, previous_live);
    Ok(copied)
}

/// Delete caches with this agent's prefix that are not the current version's
async fn reclaim_foreign(ctx: &AgentContext) -> ShelfResult<Vec<String>> {
    let mut reclaimed = Vec::new();
    for name in ctx.storage.keys().await? {
        if ctx.names.owns(&name) && !ctx.names.is_current(&name) {
            ctx.storage.delete(&name).await?;
            info!("Reclaimed cache {}", name);
            reclaimed.push(name);
        }
    }
    Ok(reclaimed)
}

/// Delete LIVE, STAGING and MANIFEST-RECORD so the next version starts clean.
/// Failures are logged, never returned.
pub async fn teardown(ctx: &AgentContext) {
    let names = &ctx.names;
    for name in [&names.live, &names.staging, &names.manifest_record] {
        if let Err(e) = ctx.storage.delete(name).await {
            warn!("Failed to delete cache {}: {}", name, e);
        }
    }
    info!("Caches cleared after failed activation");
}
