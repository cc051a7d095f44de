//! Resource manifests
//!
//! A manifest maps every logical path of the deployed bundle to a content
//! fingerprint. It is loaded once per worker lifetime and diffed against
//! the record of the previously activated generation.

pub mod document;
pub mod record;
pub mod resources;

pub use document::AssetManifestDocument;
pub use record::{ManifestRecord, RECORD_KEY};
pub use resources::ResourceManifest;
