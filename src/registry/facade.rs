//! The registry facade used by the runtime, the request path and admin
//! tooling.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::observability::metrics;
use crate::registry::context::TaskContext;
use crate::registry::descriptor::HandlerRegistration;
use crate::registry::error::{CycleTrigger, HandlerError, LifecycleStep, RegistryError};
use crate::registry::handler::{HandlerStatus, ManagedHandler};
use crate::registry::hooks::{NoopHooks, RegistryHooks};
use crate::registry::scheduler::{
    InitedHandlerInfo, InitializationScheduler, Members, DEFAULT_DRAIN_TIMEOUT,
    DEFAULT_INIT_CONCURRENCY,
};
use crate::registry::table::{HandlerTable, RegistrySnapshot};
use crate::registry::trace::TraceFilter;

/// Tunables for a registry's init pool.
#[derive(Debug, Clone, Copy)]
pub struct RegistrySettings {
    pub init_concurrency: usize,
    pub drain_timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            init_concurrency: DEFAULT_INIT_CONCURRENCY,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Lifecycle registry for a set of named handlers.
///
/// The registry is the only writer of its [`HandlerTable`]; any number of
/// request tasks may read through [`HandlerRegistry::handler`] at the same
/// time, including while another handler is being reinitialized.
pub struct HandlerRegistry {
    table: Arc<HandlerTable>,
    members: Arc<Members>,
    hooks: Arc<dyn RegistryHooks>,
    settings: RegistrySettings,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl HandlerRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self::with_hooks(settings, Arc::new(NoopHooks))
    }

    pub fn with_hooks(settings: RegistrySettings, hooks: Arc<dyn RegistryHooks>) -> Self {
        Self {
            table: Arc::new(HandlerTable::new()),
            members: Arc::new(Members::new()),
            hooks,
            settings,
        }
    }

    pub fn settings(&self) -> RegistrySettings {
        self.settings
    }

    /// Bring up every handler the registrations resolve to.
    ///
    /// FIRST-order registrations are initialized one by one before the
    /// NORMAL ones fan out. Fails if any handler vetoes; handlers that fail
    /// without vetoing are left out of the active set.
    pub async fn init(
        &self,
        registrations: Vec<HandlerRegistration>,
        ctx: &TaskContext,
    ) -> Result<Vec<InitedHandlerInfo>, RegistryError> {
        let scheduler = InitializationScheduler::new(
            self.table.clone(),
            self.members.clone(),
            self.hooks.clone(),
        )
        .with_concurrency(self.settings.init_concurrency)
        .with_drain_timeout(self.settings.drain_timeout);

        scheduler.init(registrations, ctx).await
    }

    /// Cycle a handler through deactivate → shutdown → init → activate.
    ///
    /// No-op if the registry does not know the name. Works on active and
    /// failed handlers alike. On failure the handler stays in whatever state
    /// the failing step left it; nothing is rolled back.
    pub async fn reinit_handler(&self, name: &str, ctx: &TaskContext) -> Result<(), RegistryError> {
        self.cycle(name, ctx, CycleTrigger::Reinit).await
    }

    /// Administrative entry point with the same transitions as
    /// [`HandlerRegistry::reinit_handler`].
    pub async fn reload_handler(&self, name: &str, ctx: &TaskContext) -> Result<(), RegistryError> {
        self.cycle(name, ctx, CycleTrigger::Reload).await
    }

    async fn cycle(&self, name: &str, ctx: &TaskContext, trigger: CycleTrigger) -> Result<(), RegistryError> {
        let Some(handler) = self.member(name) else {
            debug!(handler = %name, %trigger, "Unknown handler, nothing to cycle");
            return Ok(());
        };

        let _lifecycle = handler.lock().await;
        info!(handler = %name, %trigger, version = %handler.version(), "Cycling handler");

        // Readers get "not found" until the handler is active again, never
        // a handler that is mid-deactivation.
        self.table.remove_instance(&handler);
        metrics::set_active_handlers(self.table.len());

        match self.run_cycle(&handler, ctx).await {
            Ok(()) => {
                self.table.put(name, handler.clone());
                metrics::set_active_handlers(self.table.len());
                metrics::record_handler_cycle(name, trigger, true);
                info!(handler = %name, %trigger, "Handler cycled");
                Ok(())
            }
            Err((step, source)) => {
                metrics::record_handler_cycle(name, trigger, false);
                error!(
                    handler = %name,
                    kind = handler.kind(),
                    %trigger,
                    %step,
                    error = %source,
                    "Error cycling handler"
                );
                Err(RegistryError::Cycle {
                    handler: name.to_string(),
                    kind: handler.kind().to_string(),
                    trigger,
                    step,
                    source,
                })
            }
        }
    }

    async fn run_cycle(
        &self,
        handler: &ManagedHandler,
        ctx: &TaskContext,
    ) -> Result<(), (LifecycleStep, Arc<HandlerError>)> {
        handler
            .run_deactivate()
            .map_err(|e| (LifecycleStep::Deactivate, Arc::new(e)))?;
        handler
            .run_shutdown(ctx)
            .await
            .map_err(|e| (LifecycleStep::Shutdown, Arc::new(e)))?;

        let outcome = handler.run_init(ctx).await;
        if !outcome.is_success() {
            let cause = outcome.cause().cloned().unwrap_or_else(|| {
                Arc::new(HandlerError::msg(format!(
                    "init reported {} without a cause",
                    outcome.status().as_str()
                )))
            });
            return Err((LifecycleStep::Init, cause));
        }

        self.hooks.post_init(handler);
        handler
            .run_activate()
            .map_err(|e| (LifecycleStep::Activate, Arc::new(e)))
    }

    /// Shut down every active handler: shutdown → deactivate → unregister.
    ///
    /// Best effort. A handler that fails is logged and left in place; the
    /// others still go down.
    pub async fn shutdown(&self, ctx: &TaskContext) {
        for handler in self.table.list() {
            info!(handler = handler.name(), kind = handler.kind(), "Shutting down handler");
            let stopped = {
                let _lifecycle = handler.lock().await;
                self.stop(&handler, ctx).await
            };
            match stopped {
                Ok(()) => self.unregister_handler(&handler),
                Err(e) => warn!(handler = handler.name(), error = %e, "Failed to shut down handler"),
            }
        }
        info!(remaining = self.table.len(), "Handler registry shut down");
    }

    /// Unpublish, shut down and unregister a single handler by name.
    ///
    /// Readers get "not found" from the moment teardown starts. The handler
    /// leaves the registry even if its shutdown fails; that failure is
    /// returned. Returns `Ok(false)` if the name is unknown.
    pub async fn retire_handler(&self, name: &str, ctx: &TaskContext) -> Result<bool, RegistryError> {
        let Some(handler) = self.member(name) else {
            return Ok(false);
        };

        let stopped = {
            let _lifecycle = handler.lock().await;
            let published = self.table.remove_instance(&handler);
            metrics::set_active_handlers(self.table.len());
            if published || handler.is_active() {
                self.stop(&handler, ctx).await
            } else {
                Ok(())
            }
        };
        self.unregister_handler(&handler);

        match stopped {
            Ok(()) => {
                info!(handler = %name, "Handler retired");
                Ok(true)
            }
            Err(e) => {
                warn!(handler = %name, error = %e, "Handler retired without a clean shutdown");
                Err(e)
            }
        }
    }

    /// shutdown → deactivate. Callers hold the lifecycle lock.
    async fn stop(&self, handler: &Arc<ManagedHandler>, ctx: &TaskContext) -> Result<(), RegistryError> {
        let failed = |step: LifecycleStep| {
            move |source: HandlerError| RegistryError::Shutdown {
                handler: handler.name().to_string(),
                kind: handler.kind().to_string(),
                step,
                source,
            }
        };
        handler
            .run_shutdown(ctx)
            .await
            .map_err(failed(LifecycleStep::Shutdown))?;
        handler
            .run_deactivate()
            .map_err(failed(LifecycleStep::Deactivate))
    }

    /// Remove a handler from the registry, then run the post-unregister hook.
    pub fn unregister_handler(&self, handler: &Arc<ManagedHandler>) {
        self.table.remove_instance(handler);
        self.members
            .remove_if(handler.name(), |_, m| Arc::ptr_eq(m, handler));
        metrics::set_active_handlers(self.table.len());
        self.hooks.post_unregister(handler);
    }

    // --- Read accessors ---

    /// Currently active handlers.
    pub fn handlers(&self) -> Vec<Arc<ManagedHandler>> {
        self.table.list()
    }

    /// The active handler with this name.
    pub fn handler(&self, name: &str) -> Option<Arc<ManagedHandler>> {
        self.table.get(name)
    }

    pub fn trace_filter_for_handler(&self, name: &str) -> Option<Arc<dyn TraceFilter>> {
        self.table.trace_filter(name)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.table.snapshot()
    }

    /// Any handler known to the registry, active or not.
    pub fn member(&self, name: &str) -> Option<Arc<ManagedHandler>> {
        self.members.get(name).map(|m| m.value().clone())
    }

    /// Status of every handler known to the registry, sorted by name.
    pub fn statuses(&self) -> Vec<HandlerStatus> {
        let mut statuses: Vec<HandlerStatus> =
            self.members.iter().map(|m| m.value().status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new(RegistrySettings::default())
    }
}
