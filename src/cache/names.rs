//! Cache role naming
//!
//! | Role | Name |
//! |------|------|
//! | STAGING | `{prefix}-temp-cache[-{version}]` |
//! | LIVE | `{prefix}-app-cache[-{version}]` |
//! | MANIFEST-RECORD | `{prefix}-app-manifest` |
//!
//! The version suffix is only applied when `cache.version_scoped` is set.
//! The record is never version scoped: it must survive an upgrade to be
//! diffed against.

use crate::config::CacheConfig;

/// Names of the three caches one worker version uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    prefix: String,
    pub staging: String,
    pub live: String,
    pub manifest_record: String,
}

impl CacheNames {
    pub fn new(config: &CacheConfig, version: Option<&str>) -> Self {
        let prefix = config.prefix.clone();
        let suffix = match version {
            Some(v) if config.version_scoped => format!("-{}", v),
            _ => String::new(),
        };

        Self {
            staging: format!("{}-temp-cache{}", prefix, suffix),
            live: format!("{}-app-cache{}", prefix, suffix),
            manifest_record: format!("{}-app-manifest", prefix),
            prefix,
        }
    }

    /// Whether `name` belongs to this agent (any version)
    pub fn owns(&self, name: &str) -> bool {
        name.strip_prefix(&self.prefix)
            .is_some_and(|rest| rest.starts_with('-'))
    }

    /// Whether `name` is one of this version's caches
    pub fn is_current(&self, name: &str) -> bool {
        name == self.staging || name == self.live || name == self.manifest_record
    }
}
