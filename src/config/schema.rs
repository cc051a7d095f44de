//! Configuration schema for shelf
//!
//! Configuration is stored at `~/.config/shelf/config.toml`

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Named cache settings
    pub cache: CacheConfig,

    /// Install/activate behaviour
    pub lifecycle: LifecycleConfig,

    /// Network settings
    pub network: NetworkConfig,

    /// Request routing
    pub router: RouterConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Named cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix shared by every cache this agent owns
    pub prefix: String,

    /// Suffix staging and live cache names with the version token
    pub version_scoped: bool,

    /// Delete caches carrying the prefix that the current version does not use
    pub reclaim_foreign: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "shelf".to_string(),
            version_scoped: false,
            reclaim_foreign: true,
        }
    }
}

/// When the optional asset pass runs relative to activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionalAssetPolicy {
    /// Never fetch optional assets
    Disabled,
    /// Fetch before clients are claimed
    Blocking,
    /// Fetch after clients are claimed without delaying activation
    #[default]
    Background,
}

/// Lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Request immediate takeover as soon as install starts
    pub skip_waiting_on_install: bool,

    /// Optional asset pass timing
    pub optional_assets: OptionalAssetPolicy,

    /// Path of the runtime asset manifest document, relative to the scope
    pub assets_manifest: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            skip_waiting_on_install: true,
            optional_assets: OptionalAssetPolicy::Background,
            assets_manifest: "assets_manifest.json".to_string(),
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Per-fetch timeout in seconds (0 = no timeout)
    pub timeout_secs: u64,
}

impl NetworkConfig {
    /// Effective fetch timeout, if any
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Request routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Query parameter the page appends for cache busting
    pub cache_bust_param: String,

    /// Extensions served stale-while-revalidate
    pub revalidate_extensions: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cache_bust_param: "v".to_string(),
            revalidate_extensions: [
                "png", "jpg", "jpeg", "gif", "svg", "webp", "mp3", "wav", "ogg", "json", "woff",
                "woff2", "ttf", "otf",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}
