//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Init handler registry → Start listeners
//!
//! Reload (reload.rs):
//!     Config file changed → Diff handlers → Retire / init → Swap routes
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → Stop accepting → Drain connections
//!         → Shut down handlers → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then handlers, then listeners
//! - Ordered shutdown: stop accept, drain, then handlers

pub mod reload;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use reload::{apply_handler_changes, diff_handlers, HandlerChanges, ReloadReport};
pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{start_handlers, task_context, StartupError};
