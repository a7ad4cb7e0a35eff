//! Built-in handler implementations and the catalog that builds them.
//!
//! # Data Flow
//! ```text
//! [[handlers]] config entry (kind, vetoing, settings)
//!     → HandlerCatalog (kind → builder)
//!     → HandlerRegistration (descriptor + factory)
//!     → registry init
//! ```
//!
//! # Design Decisions
//! - The catalog is an explicit list: no discovery, no reflection
//! - Handlers re-read their settings on every init, so a reload picks up
//!   edits to a handler's config file
//! - Severity of an init failure follows the entry's `vetoing` flag

pub mod http_proxy;
pub mod static_response;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::HandlerConfig;
use crate::registry::{Handler, HandlerDescriptor, HandlerError, HandlerRegistration};

/// Handler kinds available without any extra registration.
pub const BUILTIN_KINDS: &[&str] = &[http_proxy::KIND, static_response::KIND];

/// Per-entry options that are not part of the descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerOptions {
    pub vetoing: bool,
}

/// Builds one handler instance for a descriptor.
pub type HandlerBuilder =
    fn(&HandlerDescriptor, &HandlerOptions) -> Result<Arc<dyn Handler>, HandlerError>;

/// Maps handler kinds to their builders.
#[derive(Clone, Default)]
pub struct HandlerCatalog {
    builders: HashMap<String, HandlerBuilder>,
}

impl HandlerCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog with every built-in kind.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.register(http_proxy::KIND, http_proxy::build);
        catalog.register(static_response::KIND, static_response::build);
        catalog
    }

    /// Add or replace a kind.
    pub fn register(&mut self, kind: impl Into<String>, builder: HandlerBuilder) {
        self.builders.insert(kind.into(), builder);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.builders.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Registration for one config entry.
    pub fn registration(&self, config: &HandlerConfig) -> Result<HandlerRegistration, HandlerError> {
        let builder = *self
            .builders
            .get(&config.kind)
            .ok_or_else(|| HandlerError::Config(format!("unknown handler kind {}", config.kind)))?;
        let options = HandlerOptions {
            vetoing: config.vetoing,
        };

        Ok(HandlerRegistration::new(
            config.descriptor(),
            move |descriptor: &HandlerDescriptor| builder(descriptor, &options).map(|h| vec![h]),
        ))
    }

    /// Registrations for config entries, in declaration order.
    pub fn registrations(&self, configs: &[HandlerConfig]) -> Result<Vec<HandlerRegistration>, HandlerError> {
        configs.iter().map(|c| self.registration(c)).collect()
    }
}
