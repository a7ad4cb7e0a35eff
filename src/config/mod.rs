//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → handlers → HandlerRegistration[] → registry init
//!
//! On change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → lifecycle::reload reconciles handlers, route table is swapped
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes arrive as a whole new config
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, HandlerConfig, ListenerConfig, LogFormat, ObservabilityConfig, ProxyConfig,
    RegistryConfig, RouteConfig, TimeoutConfig,
};
