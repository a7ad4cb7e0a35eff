//! The handler capability and the registry's per-instance lifecycle record.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::{ArcSwap, ArcSwapOption};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::observability::metrics;
use crate::registry::context::TaskContext;
use crate::registry::descriptor::HandlerDescriptor;
use crate::registry::error::{error_chain, HandlerError};
use crate::registry::trace::TraceFilter;

/// Severity of an init attempt's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitStatus {
    Success,
    /// Startup must not proceed.
    Veto,
    /// The handler is optional; siblings carry on without it.
    NonVetoFailure,
}

impl InitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitStatus::Success => "success",
            InitStatus::Veto => "veto",
            InitStatus::NonVetoFailure => "non_veto_failure",
        }
    }
}

/// Tagged result of one init attempt.
#[derive(Debug, Clone)]
pub struct InitOutcome {
    status: InitStatus,
    cause: Option<Arc<HandlerError>>,
}

impl InitOutcome {
    pub fn success() -> Self {
        Self {
            status: InitStatus::Success,
            cause: None,
        }
    }

    pub fn veto(cause: HandlerError) -> Self {
        Self {
            status: InitStatus::Veto,
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn non_veto(cause: HandlerError) -> Self {
        Self {
            status: InitStatus::NonVetoFailure,
            cause: Some(Arc::new(cause)),
        }
    }

    /// Failure whose severity follows the handler's vetoing flag.
    pub fn failure(vetoing: bool, cause: HandlerError) -> Self {
        if vetoing {
            Self::veto(cause)
        } else {
            Self::non_veto(cause)
        }
    }

    pub fn status(&self) -> InitStatus {
        self.status
    }

    pub fn cause(&self) -> Option<&Arc<HandlerError>> {
        self.cause.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.status == InitStatus::Success
    }
}

/// Failure severity recorded in [`LifecycleState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Vetoing,
    NonVetoing,
}

/// Lifecycle state of a registered handler instance.
///
/// ```text
/// Uninitialized → Initializing → Active | Failed
/// Active → Deactivated → Uninitialized → Initializing → Active   (reinit)
/// Active → Uninitialized → Deactivated → removed                 (shutdown)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Active,
    Deactivated,
    Failed(Severity),
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Active => "active",
            LifecycleState::Deactivated => "deactivated",
            LifecycleState::Failed(Severity::Vetoing) => "failed_vetoing",
            LifecycleState::Failed(Severity::NonVetoing) => "failed_non_vetoing",
        }
    }
}

impl From<u8> for LifecycleState {
    fn from(val: u8) -> Self {
        match val {
            1 => LifecycleState::Initializing,
            2 => LifecycleState::Active,
            3 => LifecycleState::Deactivated,
            4 => LifecycleState::Failed(Severity::Vetoing),
            5 => LifecycleState::Failed(Severity::NonVetoing),
            _ => LifecycleState::Uninitialized,
        }
    }
}

impl From<LifecycleState> for u8 {
    fn from(state: LifecycleState) -> Self {
        match state {
            LifecycleState::Uninitialized => 0,
            LifecycleState::Initializing => 1,
            LifecycleState::Active => 2,
            LifecycleState::Deactivated => 3,
            LifecycleState::Failed(Severity::Vetoing) => 4,
            LifecycleState::Failed(Severity::NonVetoing) => 5,
        }
    }
}

/// A pluggable unit of protocol logic driven by the registry.
///
/// Implementations use interior mutability: every call takes `&self`
/// because an active handler is shared with the request path. The
/// registry guarantees lifecycle calls on one instance never overlap.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &str;

    /// Implementation type, used in logs and error reports.
    fn kind(&self) -> &str {
        "handler"
    }

    /// Acquire resources. Failures are reported through the outcome's
    /// severity, not by panicking.
    async fn init(&self, ctx: &TaskContext) -> InitOutcome;

    fn activate(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn deactivate(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Release whatever `init` acquired.
    async fn shutdown(&self, ctx: &TaskContext) -> Result<(), HandlerError>;

    fn trace_filter(&self) -> Option<Arc<dyn TraceFilter>> {
        None
    }

    /// Serve one request routed to this handler.
    async fn handle(&self, _request: Request<Body>) -> Result<Response<Body>, HandlerError> {
        Err(HandlerError::Unsupported(self.name().to_string()))
    }
}

/// Registry-side record of one handler instance.
///
/// Owns the lifecycle state, the version tag assigned at selection time
/// and the last init outcome. Readers load these without locking; the
/// `lifecycle` lock serializes lifecycle transitions on the instance.
pub struct ManagedHandler {
    name: String,
    handler: Arc<dyn Handler>,
    descriptor: ArcSwap<HandlerDescriptor>,
    state: AtomicU8,
    outcome: ArcSwapOption<InitOutcome>,
    lifecycle: Mutex<()>,
}

impl ManagedHandler {
    pub fn new(handler: Arc<dyn Handler>, descriptor: Arc<HandlerDescriptor>) -> Self {
        Self {
            name: handler.name().to_string(),
            handler,
            descriptor: ArcSwap::new(descriptor),
            state: AtomicU8::new(LifecycleState::Uninitialized.into()),
            outcome: ArcSwapOption::empty(),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        self.handler.kind()
    }

    pub fn version(&self) -> String {
        self.descriptor.load().version().to_string()
    }

    pub fn descriptor(&self) -> Arc<HandlerDescriptor> {
        self.descriptor.load_full()
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    /// Outcome of the most recent init attempt, if any.
    pub fn init_outcome(&self) -> Option<InitOutcome> {
        self.outcome.load_full().map(|o| o.as_ref().clone())
    }

    pub fn trace_filter(&self) -> Option<Arc<dyn TraceFilter>> {
        self.handler.trace_filter()
    }

    /// The wrapped implementation.
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, HandlerError> {
        self.handler.handle(request).await
    }

    pub fn status(&self) -> HandlerStatus {
        let outcome = self.init_outcome();
        let descriptor = self.descriptor();
        HandlerStatus {
            name: self.name.clone(),
            kind: self.kind().to_string(),
            version: descriptor.version().to_string(),
            config_source: descriptor.config_source().to_string(),
            state: self.state().as_str(),
            outcome: outcome.as_ref().map(InitOutcome::status),
            cause: outcome
                .as_ref()
                .and_then(|o| o.cause().map(|c| error_chain(c.as_ref()))),
        }
    }

    // --- Lifecycle transitions, driven by the registry only ---

    /// Assign the descriptor (and with it the version tag) this instance
    /// was selected for.
    pub(crate) fn select(&self, descriptor: Arc<HandlerDescriptor>) {
        self.descriptor.store(descriptor);
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }

    /// True while some lifecycle transition holds the instance.
    pub(crate) fn is_busy(&self) -> bool {
        self.lifecycle.try_lock().is_err()
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(state.into(), Ordering::Release);
    }

    pub(crate) async fn run_init(&self, ctx: &TaskContext) -> InitOutcome {
        self.set_state(LifecycleState::Initializing);
        let started = Instant::now();
        let outcome = self.handler.init(ctx).await;
        metrics::record_handler_init(&self.name, outcome.status(), started);

        match outcome.status() {
            InitStatus::Success => {}
            InitStatus::Veto => self.set_state(LifecycleState::Failed(Severity::Vetoing)),
            InitStatus::NonVetoFailure => {
                self.set_state(LifecycleState::Failed(Severity::NonVetoing))
            }
        }
        self.outcome.store(Some(Arc::new(outcome.clone())));
        outcome
    }

    pub(crate) fn run_activate(&self) -> Result<(), HandlerError> {
        self.handler.activate()?;
        self.set_state(LifecycleState::Active);
        Ok(())
    }

    pub(crate) fn run_deactivate(&self) -> Result<(), HandlerError> {
        self.handler.deactivate()?;
        self.set_state(LifecycleState::Deactivated);
        Ok(())
    }

    pub(crate) async fn run_shutdown(&self, ctx: &TaskContext) -> Result<(), HandlerError> {
        self.handler.shutdown(ctx).await?;
        self.set_state(LifecycleState::Uninitialized);
        Ok(())
    }

    /// Record a failure that happened after a successful init.
    pub(crate) fn mark_failed(&self, outcome: InitOutcome) {
        let severity = match outcome.status() {
            InitStatus::Veto => Severity::Vetoing,
            _ => Severity::NonVetoing,
        };
        self.set_state(LifecycleState::Failed(severity));
        self.outcome.store(Some(Arc::new(outcome)));
    }
}

impl fmt::Debug for ManagedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedHandler")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("version", &self.version())
            .field("state", &self.state())
            .finish()
    }
}

/// Serializable view of a handler for admin tooling.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerStatus {
    pub name: String,
    pub kind: String,
    pub version: String,
    pub config_source: String,
    pub state: &'static str,
    pub outcome: Option<InitStatus>,
    pub cause: Option<Vec<String>>,
}
