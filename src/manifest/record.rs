//! Persisted copy of the last activated manifest
//!
//! Stored as a single JSON response under [`RECORD_KEY`] in the
//! MANIFEST-RECORD cache. Only read for diffing, never served.

use crate::cache::CachedResponse;
use crate::error::{ShelfError, ShelfResult};
use crate::manifest::ResourceManifest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key the record is stored under
pub const RECORD_KEY: &str = "manifest";

/// The manifest generation that produced the current live cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Version token active when the record was written
    pub version: Option<String>,

    /// LIVE cache the recorded resources were activated into
    #[serde(default)]
    pub live_cache: Option<String>,

    /// When activation completed
    pub activated_at: DateTime<Utc>,

    /// Path → fingerprint at activation time
    pub resources: BTreeMap<String, String>,
}

/// Records written by older agents are a bare path → fingerprint map
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRecord {
    Full(ManifestRecord),
    Bare(BTreeMap<String, String>),
}

impl ManifestRecord {
    /// Capture the current manifest
    pub fn capture(manifest: &ResourceManifest, version: Option<String>, live_cache: &str) -> Self {
        Self {
            version,
            live_cache: Some(live_cache.to_string()),
            activated_at: Utc::now(),
            resources: manifest.resources().clone(),
        }
    }

    /// Encode as a storable response
    pub fn to_response(&self) -> ShelfResult<CachedResponse> {
        let body = serde_json::to_vec(self)?;
        Ok(CachedResponse::new(200, body).with_header("content-type", "application/json"))
    }

    /// Decode a stored record
    pub fn from_response(response: &CachedResponse) -> ShelfResult<Self> {
        let stored: StoredRecord = serde_json::from_slice(response.body())
            .map_err(|e| ShelfError::manifest("manifest record", e))?;

        Ok(match stored {
            StoredRecord::Full(record) => record,
            StoredRecord::Bare(resources) => Self {
                version: None,
                live_cache: None,
                activated_at: DateTime::<Utc>::UNIX_EPOCH,
                resources,
            },
        })
    }
}
