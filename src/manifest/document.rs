//! Runtime asset manifest document
//!
//! Fetched as JSON at runtime. Besides the flat fingerprint mapping it
//! groups optional assets by category:
//!
//! ```json
//! {
//!   "resources": { "main.dart.js": "9fd6ba5a" },
//!   "core": ["main.dart.js"],
//!   "images": ["assets/images/bullet.png"],
//!   "audio": ["assets/audio/shoot.wav"],
//!   "fonts": null
//! }
//! ```

use crate::error::{ShelfError, ShelfResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Directory the bundler copies declared assets into
const ASSET_DIR: &str = "assets/";

/// Parsed asset manifest document. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifestDocument {
    #[serde(default)]
    pub resources: BTreeMap<String, String>,

    #[serde(default)]
    pub core: Vec<String>,

    #[serde(default)]
    pub images: Option<Vec<String>>,

    #[serde(default)]
    pub audio: Option<Vec<String>>,

    #[serde(default)]
    pub fonts: Option<Vec<String>>,
}

impl AssetManifestDocument {
    /// Parse a document body
    pub fn parse(body: &[u8]) -> ShelfResult<Self> {
        serde_json::from_slice(body).map_err(|e| ShelfError::manifest("asset manifest", e))
    }

    /// Served paths of the optional assets across every category, deduplicated
    /// in first-seen order.
    ///
    /// Declared assets (`assets/images/x.png`) are served from the bundle's
    /// asset directory (`assets/assets/images/x.png`); any other entry is
    /// already relative to the scope.
    pub fn optional_assets(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        let categories = [&self.images, &self.audio, &self.fonts];

        for asset in categories.into_iter().flatten().flatten() {
            let path = normalize_asset_path(asset);
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }
}

fn normalize_asset_path(asset: &str) -> String {
    let trimmed = asset.trim_start_matches("./").trim_start_matches('/');
    if trimmed.starts_with(ASSET_DIR) {
        format!("{}{}", ASSET_DIR, trimmed)
    } else {
        trimmed.to_string()
    }
}
