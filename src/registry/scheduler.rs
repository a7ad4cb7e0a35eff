//! Ordered, bounded-concurrency handler bring-up.
//!
//! # Stages
//! ```text
//! registrations (stable-sorted by load order)
//!     → FIRST prefix: one descriptor at a time, one worker
//!     → NORMAL rest: every resolved instance is a unit on a pool of
//!       `concurrency` workers
//! ```
//!
//! # Invariants
//! - Every FIRST handler reaches a terminal outcome before any NORMAL
//!   handler starts.
//! - A unit holds its handler's lifecycle lock for the whole attempt, so an
//!   instance is never initialized concurrently with itself.
//! - A VETO stops admission of new units, drains the running ones and fails
//!   the call. Handlers the failed stage had already published are
//!   unpublished and shut down again. A non-vetoing failure only removes
//!   that handler.
//! - A name is held by one instance at a time. A new instance only replaces
//!   a holder that is not active.
//! - The worker pool lives for one stage and is gone when the stage returns.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::observability::metrics;
use crate::registry::context::TaskContext;
use crate::registry::descriptor::{HandlerDescriptor, HandlerRegistration, LoadOrder};
use crate::registry::error::RegistryError;
use crate::registry::handler::{Handler, InitOutcome, InitStatus, ManagedHandler};
use crate::registry::hooks::RegistryHooks;
use crate::registry::table::HandlerTable;

/// Default number of handlers initialized concurrently.
pub const DEFAULT_INIT_CONCURRENCY: usize = 5;

/// Default bound on draining the init pool after a fatal failure.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Every handler instance ever handed to a registry, keyed by name,
/// whatever its state.
pub(crate) type Members = DashMap<String, Arc<ManagedHandler>>;

/// A handler that was initialized and activated, with the descriptor it was
/// selected for.
#[derive(Debug, Clone)]
pub struct InitedHandlerInfo {
    pub handler: Arc<ManagedHandler>,
    pub descriptor: Arc<HandlerDescriptor>,
}

/// Drives batches of registrations through init and activate.
pub struct InitializationScheduler {
    table: Arc<HandlerTable>,
    members: Arc<Members>,
    hooks: Arc<dyn RegistryHooks>,
    concurrency: usize,
    drain_timeout: Duration,
}

struct InitUnit {
    handler: Arc<ManagedHandler>,
    descriptor: Arc<HandlerDescriptor>,
}

enum UnitResult {
    Activated(InitedHandlerInfo),
    AlreadyActive(String),
    Skipped(String),
    Failed {
        name: String,
        kind: String,
        outcome: InitOutcome,
    },
}

enum Attempt {
    Activated,
    AlreadyActive,
    Skipped,
    Failed(InitOutcome),
}

/// State shared by the units of one stage.
struct Stage {
    table: Arc<HandlerTable>,
    hooks: Arc<dyn RegistryHooks>,
    vetoed: AtomicBool,
}

impl InitializationScheduler {
    pub(crate) fn new(
        table: Arc<HandlerTable>,
        members: Arc<Members>,
        hooks: Arc<dyn RegistryHooks>,
    ) -> Self {
        Self {
            table,
            members,
            hooks,
            concurrency: DEFAULT_INIT_CONCURRENCY,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Initialize and activate every handler the registrations resolve to.
    ///
    /// Returns the newly activated handlers in completion order. Handlers
    /// that were already active are skipped and not returned.
    pub async fn init(
        &self,
        mut registrations: Vec<HandlerRegistration>,
        ctx: &TaskContext,
    ) -> Result<Vec<InitedHandlerInfo>, RegistryError> {
        // stable: ties keep their input order
        registrations.sort_by_key(HandlerRegistration::load_order);
        let split = registrations
            .iter()
            .position(|r| r.load_order() != LoadOrder::First)
            .unwrap_or(registrations.len());
        let normal = registrations.split_off(split);

        let mut inited = Vec::new();
        let mut claimed = HashSet::new();

        for registration in &registrations {
            let units = self.resolve(registration, &mut claimed)?;
            inited.extend(self.run_stage(units, 1, ctx).await?);
        }

        if !normal.is_empty() {
            let mut units = Vec::new();
            for registration in &normal {
                units.extend(self.resolve(registration, &mut claimed)?);
            }
            inited.extend(self.run_stage(units, self.concurrency, ctx).await?);
        }

        info!(
            first = registrations.len(),
            normal = normal.len(),
            activated = inited.len(),
            "Handler initialization complete"
        );
        Ok(inited)
    }

    fn resolve(
        &self,
        registration: &HandlerRegistration,
        claimed: &mut HashSet<String>,
    ) -> Result<Vec<InitUnit>, RegistryError> {
        let descriptor = registration.descriptor();
        let handlers = registration
            .resolve()
            .map_err(|source| RegistryError::Resolution {
                descriptor: descriptor.name().to_string(),
                source,
            })?;

        if handlers.is_empty() {
            debug!(descriptor = descriptor.name(), "Descriptor resolved to no handler instances");
        }

        handlers
            .into_iter()
            .map(|handler| {
                Ok(InitUnit {
                    handler: self.select(handler, descriptor, claimed)?,
                    descriptor: descriptor.clone(),
                })
            })
            .collect()
    }

    /// The registry's record for this handler instance.
    ///
    /// Re-running init with the same instance reuses its record, so an
    /// active handler is skipped. A different instance may only take over a
    /// name whose current holder is neither active nor mid-transition, and
    /// was not claimed earlier in the same call.
    fn select(
        &self,
        handler: Arc<dyn Handler>,
        descriptor: &Arc<HandlerDescriptor>,
        claimed: &mut HashSet<String>,
    ) -> Result<Arc<ManagedHandler>, RegistryError> {
        let first_claim = claimed.insert(handler.name().to_string());
        match self.members.entry(handler.name().to_string()) {
            Entry::Vacant(vacant) => {
                let managed = Arc::new(ManagedHandler::new(handler, descriptor.clone()));
                vacant.insert(managed.clone());
                Ok(managed)
            }
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().clone();
                if Arc::ptr_eq(current.handler(), &handler) {
                    return Ok(current);
                }
                if !first_claim
                    || current.is_active()
                    || current.is_busy()
                    || self.table.contains(current.name())
                {
                    return Err(RegistryError::Conflict {
                        handler: current.name().to_string(),
                        active_version: current.version(),
                    });
                }

                info!(
                    handler = current.name(),
                    previous_version = %current.version(),
                    version = descriptor.version(),
                    "Replacing inactive handler instance"
                );
                let managed = Arc::new(ManagedHandler::new(handler, descriptor.clone()));
                occupied.insert(managed.clone());
                Ok(managed)
            }
        }
    }

    async fn run_stage(
        &self,
        units: Vec<InitUnit>,
        concurrency: usize,
        ctx: &TaskContext,
    ) -> Result<Vec<InitedHandlerInfo>, RegistryError> {
        let stage = Arc::new(Stage {
            table: self.table.clone(),
            hooks: self.hooks.clone(),
            vetoed: AtomicBool::new(false),
        });
        let permits = Arc::new(Semaphore::new(concurrency));
        let mut workers = JoinSet::new();
        let mut names = HashMap::new();
        let dispatched = units.len();

        for unit in units {
            let name = unit.handler.name().to_string();
            let stage = stage.clone();
            let permits = permits.clone();
            let ctx = ctx.clone();
            let handle = workers.spawn(async move {
                // a closed semaphore means the stage was vetoed
                let Ok(_permit) = permits.acquire_owned().await else {
                    return UnitResult::Skipped(unit.handler.name().to_string());
                };
                stage.run_unit(unit, &ctx).await
            });
            names.insert(handle.id(), name);
        }

        let mut inited = Vec::new();
        let mut fatal = None;

        while let Some(joined) = workers.join_next_with_id().await {
            match joined {
                Ok((_, UnitResult::Activated(info))) => inited.push(info),
                Ok((_, UnitResult::AlreadyActive(name))) => {
                    debug!(handler = %name, "Handler already active, skipping init");
                }
                Ok((_, UnitResult::Skipped(name))) => {
                    debug!(handler = %name, "Handler init skipped");
                }
                Ok((_, UnitResult::Failed { name, kind, outcome })) => {
                    if outcome.status() == InitStatus::Veto {
                        fatal = Some(RegistryError::Veto {
                            handler: name,
                            kind,
                            cause: outcome.cause().cloned(),
                        });
                        break;
                    }
                    warn!(
                        handler = %name,
                        kind = %kind,
                        "Continuing after init failed for non-vetoing handler"
                    );
                }
                Err(e) => {
                    let handler = names
                        .get(&e.id())
                        .cloned()
                        .unwrap_or_else(|| "<unknown>".to_string());
                    error!(handler = %handler, error = %e, "Handler init worker terminated abnormally");
                    fatal = Some(RegistryError::PoolTermination {
                        handler,
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }

        if let Some(err) = fatal {
            error!(handler = err.handler(), error = %err, "Aborting handler init stage");
            stage.vetoed.store(true, Ordering::Release);
            permits.close();
            inited.extend(self.drain(&mut workers).await);

            // a failed stage leaves none of its handlers published
            for info in &inited {
                self.release(&info.handler, ctx).await;
            }
            return Err(err);
        }

        debug!(dispatched, activated = inited.len(), "Handler init stage finished");
        Ok(inited)
    }

    /// Let running units finish within the drain bound, then abort the rest.
    ///
    /// Returns the units that still got activated while draining.
    async fn drain(&self, workers: &mut JoinSet<UnitResult>) -> Vec<InitedHandlerInfo> {
        let mut late = Vec::new();
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(joined) = workers.join_next().await {
                if let Ok(UnitResult::Activated(info)) = joined {
                    late.push(info);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = workers.len(),
                timeout = ?self.drain_timeout,
                "Init pool did not drain in time, aborting remaining units"
            );
            workers.shutdown().await;
        }
        late
    }

    /// Undo a publish made by a stage that went on to fail.
    async fn release(&self, handler: &Arc<ManagedHandler>, ctx: &TaskContext) {
        let _lifecycle = handler.lock().await;
        self.table.remove_instance(handler);
        metrics::set_active_handlers(self.table.len());

        if let Err(e) = handler.run_deactivate() {
            warn!(handler = handler.name(), error = %e, "Failed to deactivate handler after aborted init");
        }
        if let Err(e) = handler.run_shutdown(ctx).await {
            warn!(handler = handler.name(), error = %e, "Failed to release handler after aborted init");
        }
        info!(handler = handler.name(), "Handler unpublished after aborted init stage");
    }
}

impl Stage {
    async fn run_unit(&self, unit: InitUnit, ctx: &TaskContext) -> UnitResult {
        let InitUnit { handler, descriptor } = unit;
        let attempt = {
            let _lifecycle = handler.lock().await;
            self.attempt(&handler, &descriptor, ctx).await
        };

        let name = handler.name().to_string();
        match attempt {
            Attempt::Activated => UnitResult::Activated(InitedHandlerInfo { handler, descriptor }),
            Attempt::AlreadyActive => UnitResult::AlreadyActive(name),
            Attempt::Skipped => UnitResult::Skipped(name),
            Attempt::Failed(outcome) => UnitResult::Failed {
                kind: handler.kind().to_string(),
                name,
                outcome,
            },
        }
    }

    async fn attempt(
        &self,
        handler: &Arc<ManagedHandler>,
        descriptor: &Arc<HandlerDescriptor>,
        ctx: &TaskContext,
    ) -> Attempt {
        if handler.is_active() {
            return Attempt::AlreadyActive;
        }
        if self.vetoed.load(Ordering::Acquire) {
            return Attempt::Skipped;
        }
        handler.select(descriptor.clone());

        info!(
            handler = handler.name(),
            kind = handler.kind(),
            version = %handler.version(),
            "Initializing handler"
        );

        let outcome = handler.run_init(ctx).await;
        if !outcome.is_success() {
            let cause = outcome.cause().map(|c| c.to_string()).unwrap_or_default();
            error!(
                handler = handler.name(),
                kind = handler.kind(),
                status = outcome.status().as_str(),
                cause = %cause,
                "Error initializing handler"
            );
            return Attempt::Failed(outcome);
        }

        if self.vetoed.load(Ordering::Acquire) {
            // Vetoed while this unit ran: release what init acquired and
            // stay unpublished.
            if let Err(e) = handler.run_shutdown(ctx).await {
                warn!(handler = handler.name(), error = %e, "Failed to release handler after veto");
            }
            return Attempt::Skipped;
        }

        self.hooks.post_init(handler);

        if let Err(e) = handler.run_activate() {
            error!(handler = handler.name(), error = %e, "Error activating handler");
            let outcome = InitOutcome::non_veto(e);
            handler.mark_failed(outcome.clone());
            return Attempt::Failed(outcome);
        }

        self.table.put(handler.name(), handler.clone());
        metrics::set_active_handlers(self.table.len());
        info!(handler = handler.name(), version = %handler.version(), "Handler activated");
        Attempt::Activated
    }
}
