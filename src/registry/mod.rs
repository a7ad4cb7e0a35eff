//! Handler lifecycle registry.
//!
//! # Data Flow
//! ```text
//! HandlerRegistration[] (descriptor + factory, from config)
//!     → scheduler.rs (sort by load order)
//!         → FIRST: serial init → activate
//!         → NORMAL: bounded parallel init → activate
//!     → table.rs (publish active handlers + trace filters)
//!     → request path: facade.rs handler(name) / trace_filter_for_handler(name)
//!
//! Admin / runtime:
//!     reinit_handler | reload_handler
//!         → unpublish → deactivate → shutdown → init → activate → publish
//!     shutdown
//!         → shutdown → deactivate → unregister (per handler, best effort)
//! ```
//!
//! # Design Decisions
//! - Severity is a tagged `InitOutcome` returned by `Handler::init`
//! - A VETO aborts bring-up; a non-vetoing failure drops only that handler
//! - Only active handlers are ever visible in the table
//! - The registry is the single writer; readers never lock
//! - Init workers live for one stage, never longer than `init`

pub mod context;
pub mod descriptor;
pub mod error;
pub mod facade;
pub mod handler;
pub mod hooks;
pub mod scheduler;
pub mod table;
pub mod trace;

pub use context::TaskContext;
pub use descriptor::{ConfigSource, HandlerDescriptor, HandlerFactory, HandlerRegistration, LoadOrder};
pub use error::{error_chain, CycleTrigger, HandlerError, LifecycleStep, RegistryError};
pub use facade::{HandlerRegistry, RegistrySettings};
pub use handler::{Handler, HandlerStatus, InitOutcome, InitStatus, LifecycleState, ManagedHandler, Severity};
pub use hooks::{NoopHooks, RegistryHooks};
pub use scheduler::{InitedHandlerInfo, InitializationScheduler, DEFAULT_DRAIN_TIMEOUT, DEFAULT_INIT_CONCURRENCY};
pub use table::{HandlerTable, RegistrySnapshot};
pub use trace::{FixedSampleRateTraceFilter, TraceFilter};
