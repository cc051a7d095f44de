//! The caching agent for one deployed version
//!
//! A `Worker` drives the lifecycle state machine against an
//! [`AgentContext`] and answers the host's three entry points: lifecycle
//! events, intercepted fetches and posted control messages.

use crate::context::AgentContext;
use crate::error::{ShelfError, ShelfResult};
use crate::lifecycle::{
    self, transition, ControlMessage, Effect, LifecyclePolicy, MigrationReport, WorkerEvent,
    WorkerPhase,
};
use crate::router::{InterceptedRequest, Passthrough, Route};
use crate::strategy::{self, Served};
use crate::task::BackgroundTask;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Answer to an intercepted fetch
#[derive(Debug)]
pub enum FetchOutcome {
    /// Let the host perform the request normally
    Passthrough(Passthrough),
    /// Respond with this
    Respond(Served),
}

/// How activation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    Migrated(MigrationReport),
    /// Migration failed and the caches were cleared
    RolledBack { reason: String },
}

/// Result of [`Worker::activate`]
#[derive(Debug)]
pub struct Activation {
    pub outcome: ActivationOutcome,
    /// Work started by activation that the host must keep alive
    pub background: Vec<BackgroundTask>,
}

/// One worker version
pub struct Worker {
    id: Uuid,
    ctx: AgentContext,
    policy: LifecyclePolicy,
    phase: Mutex<WorkerPhase>,
    version: Mutex<Option<String>>,
    optional_pass_started: AtomicBool,
}

impl Worker {
    pub fn new(ctx: AgentContext) -> Self {
        let id = Uuid::new_v4();
        let policy = LifecyclePolicy::from(&ctx.config.lifecycle);
        debug!("Worker {} created for {}", id, ctx.scope);

        Self {
            id,
            policy,
            version: Mutex::new(ctx.version.clone()),
            ctx,
            phase: Mutex::new(WorkerPhase::Parsed),
            optional_pass_started: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    pub async fn phase(&self) -> WorkerPhase {
        *self.phase.lock().await
    }

    /// Version token in effect (registration URL or first in-band token)
    pub async fn version(&self) -> Option<String> {
        self.version.lock().await.clone()
    }

    /// Install: request takeover and stage the application shell.
    /// On failure the worker becomes redundant and the error is returned.
    pub async fn install(&self) -> ShelfResult<()> {
        self.run_install().instrument(self.span()).await
    }

    async fn run_install(&self) -> ShelfResult<()> {
        info!("Installing worker {}", self.id);
        let mut staged = Ok(Vec::new());

        for effect in self.apply(WorkerEvent::Install).await? {
            match effect {
                Effect::PopulateStaging => staged = lifecycle::populate_staging(&self.ctx).await,
                other => {
                    let detached = self.perform(other).await;
                    debug_assert!(detached.is_none(), "install effects run to completion");
                }
            }
        }

        match staged {
            Ok(keys) => {
                self.apply(WorkerEvent::InstallSucceeded).await?;
                info!("Worker {} installed ({} core assets)", self.id, keys.len());
                Ok(())
            }
            Err(e) => {
                self.apply(WorkerEvent::InstallFailed).await?;
                error!("Worker {} failed to install: {}", self.id, e);
                Err(e)
            }
        }
    }

    /// Activate: migrate caches and take over open pages.
    ///
    /// A failed migration is not an error for the caller: the caches are
    /// cleared, the worker still activates and serves from an empty cache.
    pub async fn activate(&self) -> ShelfResult<Activation> {
        self.run_activate().instrument(self.span()).await
    }

    async fn run_activate(&self) -> ShelfResult<Activation> {
        let mut background = Vec::new();
        let mut migrated = None;

        for effect in self.apply(WorkerEvent::Activate).await? {
            match effect {
                Effect::MigrateCaches => {
                    let version = self.version().await;
                    migrated = Some(lifecycle::migrate(&self.ctx, version).await);
                }
                other => background.extend(self.perform(other).await),
            }
        }

        let migrated = migrated
            .ok_or_else(|| ShelfError::Internal("activation did not migrate caches".into()))?;

        let (event, outcome) = match migrated {
            Ok(report) => (WorkerEvent::ActivationSucceeded, ActivationOutcome::Migrated(report)),
            Err(e) => {
                error!("Failed to upgrade worker {}: {}", self.id, e);
                (
                    WorkerEvent::ActivationFailed,
                    ActivationOutcome::RolledBack {
                        reason: e.to_string(),
                    },
                )
            }
        };

        for effect in self.apply(event).await? {
            background.extend(self.perform(effect).await);
        }

        info!("Worker {} active", self.id);
        Ok(Activation {
            outcome,
            background,
        })
    }

    /// Decide how to answer an intercepted request.
    ///
    /// Until the worker is active every request passes through.
    pub async fn handle_fetch(&self, request: &InterceptedRequest) -> ShelfResult<FetchOutcome> {
        if !self.phase().await.serves_requests() {
            return Ok(FetchOutcome::Passthrough(Passthrough::Inactive));
        }

        match self
            .ctx
            .router
            .classify(&self.ctx.scope, &self.ctx.manifest, request)
        {
            Route::Passthrough(reason) => Ok(FetchOutcome::Passthrough(reason)),
            Route::Serve { key, strategy, .. } => strategy::serve(&self.ctx, strategy, &key)
                .await
                .map(FetchOutcome::Respond),
        }
    }

    /// Handle a control message posted by a page
    pub async fn handle_message(
        &self,
        message: ControlMessage,
    ) -> ShelfResult<Vec<BackgroundTask>> {
        debug!("Worker {} received {}", self.id, message);
        let mut background = Vec::new();
        for effect in self.apply(WorkerEvent::Message(message)).await? {
            background.extend(self.perform(effect).await);
        }
        Ok(background)
    }

    /// Parse and handle a raw control message
    pub async fn handle_raw_message(&self, raw: &str) -> ShelfResult<Vec<BackgroundTask>> {
        self.handle_message(raw.parse()?).await
    }

    fn span(&self) -> Span {
        info_span!("worker", id = %self.id)
    }

    async fn apply(&self, event: WorkerEvent) -> ShelfResult<Vec<Effect>> {
        let mut phase = self.phase.lock().await;
        let step = transition(*phase, &event, &self.policy)?;
        if step.next != *phase {
            debug!("Worker {}: {} -> {} on {}", self.id, *phase, step.next, event);
        }
        *phase = step.next;
        Ok(step.effects)
    }

    /// Perform a side effect. Anything that outlives the call is returned.
    async fn perform(&self, effect: Effect) -> Option<BackgroundTask> {
        match effect {
            Effect::SkipWaiting => {
                if let Err(e) = self.ctx.host.skip_waiting().await {
                    warn!("skip_waiting failed: {}", e);
                }
                None
            }
            Effect::ClaimClients => {
                if let Err(e) = self.ctx.host.claim_clients().await {
                    warn!("claim_clients failed: {}", e);
                }
                None
            }
            Effect::TeardownCaches => {
                lifecycle::teardown(&self.ctx).await;
                None
            }
            Effect::CacheOptionalAssets { blocking } => self.optional_pass(blocking).await,
            Effect::Prefetch => {
                let ctx = self.ctx.clone();
                Some(BackgroundTask::spawn("download offline", async move {
                    if let Err(e) = lifecycle::prefetch_missing(&ctx).await {
                        warn!("Offline download failed: {}", e);
                    }
                }))
            }
            Effect::AdoptVersion(token) => {
                self.adopt_version(token).await;
                None
            }
            Effect::PopulateStaging | Effect::MigrateCaches => {
                warn!("Ignoring out-of-band {:?}", effect);
                None
            }
        }
    }

    /// Run the optional asset pass unless it already ran for this worker
    async fn optional_pass(&self, blocking: bool) -> Option<BackgroundTask> {
        if self.optional_pass_started.swap(true, Ordering::SeqCst) {
            debug!("Optional assets already requested");
            return None;
        }

        let ctx = self.ctx.clone();
        let work = async move {
            if let Err(e) = lifecycle::cache_optional_assets(&ctx).await {
                warn!("Asset manifest unavailable, skipping optional assets: {}", e);
            }
        };

        if blocking {
            work.await;
            None
        } else {
            Some(BackgroundTask::spawn("optional assets", work))
        }
    }

    async fn adopt_version(&self, token: String) {
        let mut version = self.version.lock().await;
        match version.as_deref() {
            None => {
                info!("Worker {} adopted version {}", self.id, token);
                *version = Some(token);
            }
            Some(current) if current == token => {}
            Some(current) => warn!(
                "Ignoring version {}, worker {} already runs {}",
                token, self.id, current
            ),
        }
    }
}
