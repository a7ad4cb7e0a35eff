//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → router.rs (ordered route scan)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: handler name or no match
//!
//! Route Compilation (startup and config reload):
//!     RouteConfig[]
//!     → Sort by priority
//!     → Compile matchers
//!     → Freeze as immutable Router, swapped in atomically
//! ```

pub mod matcher;
pub mod router;

pub use router::{Route, Router};
