//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Registry, handlers and request path produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for production)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (`handler = ..`) rather than formatted messages
//! - Request ID flows from the HTTP layer into handler logs
//! - Metric calls are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
