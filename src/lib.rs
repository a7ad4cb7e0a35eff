//! Pluggable request-handling proxy built around a handler lifecycle registry.
//!
//! Handlers are declared in config, brought up by the registry (FIRST-order
//! handlers serially, the rest on a bounded worker pool), and looked up by
//! name on every request. See [`registry`] for the lifecycle rules.

pub mod admin;
pub mod config;
pub mod handlers;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use handlers::HandlerCatalog;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use registry::{Handler, HandlerRegistry, InitOutcome, RegistryError, TaskContext};
