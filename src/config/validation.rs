//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference declared handlers)
//! - Validate value ranges (concurrency, timeouts, addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function of the config and the known handler kinds

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("handler #{0} has an empty name")]
    EmptyHandlerName(usize),

    #[error("handler {0} is declared more than once")]
    DuplicateHandler(String),

    #[error("handler {name} has unknown kind {kind}")]
    UnknownKind { name: String, kind: String },

    #[error("route {route} references undeclared handler {handler}")]
    UnknownRouteHandler { route: String, handler: String },

    #[error("registry.init_concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("registry.drain_timeout_secs must be greater than 0")]
    ZeroDrainTimeout,

    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },
}

/// Check a parsed config. `known_kinds` lists the handler kinds the runtime
/// can instantiate.
pub fn validate_config(config: &ProxyConfig, known_kinds: &[&str]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.registry.init_concurrency == 0 {
        errors.push(ValidationError::ZeroConcurrency);
    }
    if config.registry.drain_timeout_secs == 0 {
        errors.push(ValidationError::ZeroDrainTimeout);
    }

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }
    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    let mut names = HashSet::new();
    for (index, handler) in config.handlers.iter().enumerate() {
        if handler.name.trim().is_empty() {
            errors.push(ValidationError::EmptyHandlerName(index));
            continue;
        }
        if !names.insert(handler.name.as_str()) {
            errors.push(ValidationError::DuplicateHandler(handler.name.clone()));
        }
        if !known_kinds.contains(&handler.kind.as_str()) {
            errors.push(ValidationError::UnknownKind {
                name: handler.name.clone(),
                kind: handler.kind.clone(),
            });
        }
    }

    for route in &config.routes {
        if !names.contains(route.handler.as_str()) {
            errors.push(ValidationError::UnknownRouteHandler {
                route: route.name.clone(),
                handler: route.handler.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
