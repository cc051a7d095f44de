//! Worker lifecycle state machine
//!
//! `transition` is a pure function of (phase, event): it returns the next
//! phase and the effects to perform, in order. The [`Worker`] performs
//! the effects and feeds the results back as further events.
//!
//! ```text
//! parsed --install--> installing --ok--> installed
//!                         |
//!                         +--failed--> redundant
//!
//! installed --activate--> activating --ok--> active
//!                             |
//!                             +--failed--> active (torn down)
//! ```
//!
//! [`Worker`]: crate::worker::Worker

use crate::config::{LifecycleConfig, OptionalAssetPolicy};
use crate::error::{ShelfError, ShelfResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle phase of one worker version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerPhase {
    /// Loaded, nothing run yet
    Parsed,
    /// Staging the application shell
    Installing,
    /// Waiting to become the serving version
    Installed,
    /// Migrating caches
    Activating,
    /// Serving requests
    Active,
    /// Install failed; never serves
    Redundant,
}

impl WorkerPhase {
    /// Whether fetch interception is handled in this phase
    pub fn serves_requests(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Redundant => "redundant",
        };
        write!(f, "{}", name)
    }
}

/// Commands the hosting page can post to the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Take over immediately instead of waiting for old pages to close
    SkipWaiting,
    /// Fetch every manifest resource not cached yet
    DownloadOffline,
    /// Version token computed by the page
    SetVersion(String),
}

impl FromStr for ControlMessage {
    type Err = ShelfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "skipWaiting" => Ok(Self::SkipWaiting),
            "downloadOffline" => Ok(Self::DownloadOffline),
            other => match other.strip_prefix("version:") {
                Some(token) if !token.is_empty() => Ok(Self::SetVersion(token.to_string())),
                _ => Err(ShelfError::UnknownMessage(other.to_string())),
            },
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkipWaiting => write!(f, "skipWaiting"),
            Self::DownloadOffline => write!(f, "downloadOffline"),
            Self::SetVersion(token) => write!(f, "version:{}", token),
        }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    Install,
    InstallSucceeded,
    InstallFailed,
    Activate,
    ActivationSucceeded,
    ActivationFailed,
    Message(ControlMessage),
}

impl fmt::Display for WorkerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::InstallSucceeded => write!(f, "install-succeeded"),
            Self::InstallFailed => write!(f, "install-failed"),
            Self::Activate => write!(f, "activate"),
            Self::ActivationSucceeded => write!(f, "activation-succeeded"),
            Self::ActivationFailed => write!(f, "activation-failed"),
            Self::Message(message) => write!(f, "message({})", message),
        }
    }
}

/// Work requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Ask the host to skip the waiting grace period
    SkipWaiting,
    /// Fetch the core assets into STAGING
    PopulateStaging,
    /// Diff the manifest and migrate STAGING into LIVE
    MigrateCaches,
    /// Delete LIVE, STAGING and MANIFEST-RECORD
    TeardownCaches,
    /// Take control of open pages
    ClaimClients,
    /// Run the optional asset pass (at most once per worker)
    CacheOptionalAssets { blocking: bool },
    /// Bulk prefetch of uncached manifest resources
    Prefetch,
    /// Record the version token pushed by the page
    AdoptVersion(String),
}

/// Policy knobs the transition table depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    pub skip_waiting_on_install: bool,
    pub optional_assets: OptionalAssetPolicy,
}

impl From<&LifecycleConfig> for LifecyclePolicy {
    fn from(config: &LifecycleConfig) -> Self {
        Self {
            skip_waiting_on_install: config.skip_waiting_on_install,
            optional_assets: config.optional_assets,
        }
    }
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self::from(&LifecycleConfig::default())
    }
}

/// Result of applying one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: WorkerPhase,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: WorkerPhase, effects: Vec<Effect>) -> ShelfResult<Self> {
        Ok(Self { next, effects })
    }
}

/// Apply `event` in `phase`
pub fn transition(
    phase: WorkerPhase,
    event: &WorkerEvent,
    policy: &LifecyclePolicy,
) -> ShelfResult<Transition> {
    use Effect::*;
    use WorkerPhase::*;

    match (phase, event) {
        (Parsed, WorkerEvent::Install) => {
            let mut effects = Vec::new();
            if policy.skip_waiting_on_install {
                effects.push(SkipWaiting);
            }
            effects.push(PopulateStaging);
            Transition::to(Installing, effects)
        }
        (Installing, WorkerEvent::InstallSucceeded) => Transition::to(Installed, vec![]),
        (Installing, WorkerEvent::InstallFailed) => Transition::to(Redundant, vec![]),

        (Installed, WorkerEvent::Activate) => Transition::to(Activating, vec![MigrateCaches]),
        (Activating, WorkerEvent::ActivationSucceeded) => {
            let effects = match policy.optional_assets {
                OptionalAssetPolicy::Disabled => vec![ClaimClients],
                OptionalAssetPolicy::Blocking => {
                    vec![CacheOptionalAssets { blocking: true }, ClaimClients]
                }
                OptionalAssetPolicy::Background => {
                    vec![ClaimClients, CacheOptionalAssets { blocking: false }]
                }
            };
            Transition::to(Active, effects)
        }
        // Cache state can't be trusted; serve from an empty cache rather than a mixed one
        (Activating, WorkerEvent::ActivationFailed) => Transition::to(Active, vec![TeardownCaches]),

        (Redundant, WorkerEvent::Message(_)) => Transition::to(Redundant, vec![]),
        (current, WorkerEvent::Message(ControlMessage::SkipWaiting)) => {
            Transition::to(current, vec![SkipWaiting])
        }
        (Active, WorkerEvent::Message(ControlMessage::DownloadOffline)) => {
            Transition::to(Active, vec![Prefetch])
        }
        // LIVE is only written by activation until it completes
        (current, WorkerEvent::Message(ControlMessage::DownloadOffline)) => {
            Transition::to(current, vec![])
        }
        (Active, WorkerEvent::Message(ControlMessage::SetVersion(token))) => {
            let mut effects = vec![AdoptVersion(token.clone())];
            if policy.optional_assets != OptionalAssetPolicy::Disabled {
                effects.push(CacheOptionalAssets { blocking: false });
            }
            Transition::to(Active, effects)
        }
        (current, WorkerEvent::Message(ControlMessage::SetVersion(token))) => {
            Transition::to(current, vec![AdoptVersion(token.clone())])
        }

        (phase, event) => Err(ShelfError::InvalidTransition {
            phase,
            event: event.clone(),
        }),
    }
}
