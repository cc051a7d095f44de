//! Worker lifecycle: install, activate and bulk caching
//!
//! `state` decides what happens; the other modules do it.

pub mod activate;
pub mod install;
pub mod prefetch;
pub mod state;

pub use activate::{migrate, teardown, MigrationReport};
pub use install::populate_staging;
pub use prefetch::{cache_optional_assets, prefetch_missing, PrefetchReport};
pub use state::{
    transition, ControlMessage, Effect, LifecyclePolicy, Transition, WorkerEvent, WorkerPhase,
};
