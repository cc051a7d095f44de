//! Error types for shelf
//!
//! All modules use `ShelfResult<T>` as their return type.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::lifecycle::{WorkerEvent, WorkerPhase};

/// Result type alias for shelf operations
pub type ShelfResult<T> = Result<T, ShelfError>;

/// All errors that can occur in shelf
#[derive(Error, Debug)]
pub enum ShelfError {
    // Fetch errors
    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Fetch for {url} returned HTTP {status}")]
    FetchStatus { url: String, status: u16 },

    #[error("Fetch for {url} timed out after {after:?}")]
    FetchTimeout { url: String, after: Duration },

    // Cache store errors
    #[error("Failed to write {key} into cache {cache}: {reason}")]
    CacheWrite {
        cache: String,
        key: String,
        reason: String,
    },

    // Manifest errors
    #[error("Malformed manifest {source_name}: {reason}")]
    ManifestParse { source_name: String, reason: String },

    #[error("Core asset {0} is not listed in the resource manifest")]
    CoreAssetUnlisted(String),

    // Lifecycle errors
    #[error("Install failed: {0}")]
    Install(String),

    #[error("Event {event} is not valid while the worker is {phase}")]
    InvalidTransition {
        phase: WorkerPhase,
        event: WorkerEvent,
    },

    #[error("Invalid scope {scope}: {reason}")]
    InvalidScope { scope: String, reason: String },

    #[error("Unknown control message: {0}")]
    UnknownMessage(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShelfError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a transport-level fetch error
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a cache write error
    pub fn cache_write(
        cache: impl Into<String>,
        key: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::CacheWrite {
            cache: cache.into(),
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a manifest parse error
    pub fn manifest(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::ManifestParse {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error came from the network rather than the store
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::FetchStatus { .. } | Self::FetchTimeout { .. }
        )
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch { .. } | Self::FetchTimeout { .. } => true,
            Self::FetchStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
