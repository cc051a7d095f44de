//! Shelf - offline-first asset cache agent
//!
//! Keeps a statically served web application usable offline. A manifest
//! of resource fingerprints decides what is cached; on every deployment
//! only the resources whose fingerprint changed are refetched.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod host;
pub mod lifecycle;
pub mod manifest;
pub mod router;
pub mod strategy;
pub mod task;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use context::AgentContext;
pub use error::{ShelfError, ShelfResult};
pub use worker::Worker;
