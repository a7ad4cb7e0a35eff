//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::{
    ConfigSource, HandlerDescriptor, LoadOrder, RegistrySettings, DEFAULT_INIT_CONCURRENCY,
};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Handler registry tunables.
    pub registry: RegistryConfig,

    /// Handlers to deploy, in declaration order.
    pub handlers: Vec<HandlerConfig>,

    /// Route definitions mapping requests to handlers.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Handler registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Number of NORMAL handlers initialized concurrently.
    pub init_concurrency: usize,

    /// Bound on draining the init pool after a veto, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            init_concurrency: DEFAULT_INIT_CONCURRENCY,
            drain_timeout_secs: 10,
        }
    }
}

impl RegistryConfig {
    pub fn settings(&self) -> RegistrySettings {
        RegistrySettings {
            init_concurrency: self.init_concurrency,
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
        }
    }
}

/// A deployed handler.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HandlerConfig {
    /// Unique handler name; routes refer to it.
    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub load_order: LoadOrder,

    /// Implementation to instantiate (e.g. "http_proxy", "static").
    pub kind: String,

    /// Whether an init failure of this handler aborts startup.
    #[serde(default)]
    pub vetoing: bool,

    /// Inline handler settings.
    #[serde(default)]
    pub config: toml::Table,

    /// Settings file, re-read on every init. Takes precedence over `config`.
    #[serde(default)]
    pub config_file: Option<PathBuf>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl HandlerConfig {
    pub fn config_source(&self) -> ConfigSource {
        match &self.config_file {
            Some(path) => ConfigSource::File(path.clone()),
            None if self.config.is_empty() => ConfigSource::Empty,
            None => ConfigSource::Inline(self.config.clone()),
        }
    }

    pub fn descriptor(&self) -> HandlerDescriptor {
        HandlerDescriptor::new(
            self.name.clone(),
            self.version.clone(),
            self.load_order,
            self.config_source(),
        )
    }
}

/// Route configuration mapping requests to a handler.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RouteConfig {
    /// Route identifier for logging.
    pub name: String,

    /// Host header to match (exact match).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Handler to dispatch to.
    pub handler: String,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
