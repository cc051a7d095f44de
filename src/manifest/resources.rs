//! Path → fingerprint mapping for one deployed version

use crate::error::{ShelfError, ShelfResult};
use crate::manifest::document::AssetManifestDocument;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Versioned mapping from logical resource path to content fingerprint.
///
/// `core` lists the application shell: the paths that must be staged
/// before the worker can serve anything. Every core path is also a
/// resource, otherwise the next upgrade would prune it from the live cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceManifest {
    resources: BTreeMap<String, String>,
    #[serde(default)]
    core: Vec<String>,
}

impl ResourceManifest {
    /// Build a manifest, checking that every core path is listed
    pub fn new<I, S>(resources: BTreeMap<String, String>, core: I) -> ShelfResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = Vec::new();
        for path in core.into_iter().map(Into::into) {
            if !resources.contains_key(&path) {
                return Err(ShelfError::CoreAssetUnlisted(path));
            }
            if !seen.contains(&path) {
                seen.push(path);
            }
        }
        Ok(Self {
            resources,
            core: seen,
        })
    }

    /// Parse the flat `{"path": "fingerprint"}` form embedded at build time
    pub fn from_json<I, S>(json: &str, core: I) -> ShelfResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let resources: BTreeMap<String, String> =
            serde_json::from_str(json).map_err(|e| ShelfError::manifest("resource manifest", e))?;
        Self::new(resources, core)
    }

    /// Take the flat mapping and core list from a runtime asset manifest document
    pub fn from_document(document: &AssetManifestDocument) -> ShelfResult<Self> {
        Self::new(document.resources.clone(), document.core.iter().cloned())
    }

    /// Fingerprint recorded for `path`
    pub fn fingerprint(&self, path: &str) -> Option<&str> {
        self.resources.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.resources.contains_key(path)
    }

    /// Whether a cached copy of `path` from the `previous` generation can be kept
    pub fn is_reusable(&self, path: &str, previous: &BTreeMap<String, String>) -> bool {
        match (self.fingerprint(path), previous.get(path)) {
            (Some(current), Some(old)) => current == old,
            _ => false,
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Application shell paths, in declaration order
    pub fn core(&self) -> &[String] {
        &self.core
    }

    pub fn resources(&self) -> &BTreeMap<String, String> {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Content-derived version token: SHA256 over the sorted entries, first 12 hex chars
    pub fn version_token(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, fingerprint) in &self.resources {
            hasher.update(path.as_bytes());
            hasher.update([0u8]);
            hasher.update(fingerprint.as_bytes());
            hasher.update([b'\n']);
        }
        let result = hasher.finalize();

        // Take first 12 hex characters (6 bytes)
        hex::encode(&result[..6])
    }
}
