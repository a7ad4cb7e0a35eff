//! Applying a reloaded configuration to a running registry.
//!
//! # Data Flow
//! ```text
//! old [[handlers]] + new [[handlers]]
//!     → diff_handlers (removed / added / changed, by name)
//!     → retire removed and changed handlers
//!     → init added and changed handlers (load order honored)
//! ```
//!
//! A veto while reloading is logged and reported; it never takes the
//! running proxy down.

use std::collections::HashMap;

use crate::config::HandlerConfig;
use crate::handlers::HandlerCatalog;
use crate::registry::{error_chain, HandlerRegistry, TaskContext};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerChanges {
    pub removed: Vec<String>,
    pub added: Vec<HandlerConfig>,
    pub changed: Vec<HandlerConfig>,
}

impl HandlerChanges {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.changed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub retired: Vec<String>,
    pub started: Vec<String>,
    pub errors: Vec<String>,
}

/// Compare two handler lists by name.
pub fn diff_handlers(old: &[HandlerConfig], new: &[HandlerConfig]) -> HandlerChanges {
    let previous: HashMap<&str, &HandlerConfig> = old.iter().map(|h| (h.name.as_str(), h)).collect();
    let current: HashMap<&str, &HandlerConfig> = new.iter().map(|h| (h.name.as_str(), h)).collect();

    let mut changes = HandlerChanges {
        removed: old
            .iter()
            .filter(|h| !current.contains_key(h.name.as_str()))
            .map(|h| h.name.clone())
            .collect(),
        ..Default::default()
    };

    for handler in new {
        match previous.get(handler.name.as_str()) {
            None => changes.added.push(handler.clone()),
            Some(before) if *before != handler => changes.changed.push(handler.clone()),
            Some(_) => {}
        }
    }
    changes
}

/// Retire and start handlers so the registry matches the new config.
pub async fn apply_handler_changes(
    registry: &HandlerRegistry,
    catalog: &HandlerCatalog,
    changes: &HandlerChanges,
    ctx: &TaskContext,
) -> ReloadReport {
    let mut report = ReloadReport::default();

    let outgoing = changes
        .removed
        .iter()
        .map(String::as_str)
        .chain(changes.changed.iter().map(|h| h.name.as_str()));
    for name in outgoing {
        match registry.retire_handler(name, ctx).await {
            Ok(true) => report.retired.push(name.to_string()),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(handler = %name, error = %e, "Handler retired with errors");
                report.errors.push(error_chain(&e).join(": "));
            }
        }
    }

    let incoming: Vec<HandlerConfig> = changes.added.iter().chain(&changes.changed).cloned().collect();
    if incoming.is_empty() {
        return report;
    }

    let registrations = match catalog.registrations(&incoming) {
        Ok(registrations) => registrations,
        Err(e) => {
            report.errors.push(error_chain(&e).join(": "));
            return report;
        }
    };

    match registry.init(registrations, ctx).await {
        Ok(inited) => {
            report.started = inited.iter().map(|i| i.handler.name().to_string()).collect();
        }
        Err(e) => {
            tracing::error!(handler = e.handler(), error = %e, "Handler init failed during config reload");
            report.errors.push(error_chain(&e).join(": "));
        }
    }

    tracing::info!(
        retired = report.retired.len(),
        started = report.started.len(),
        errors = report.errors.len(),
        "Handler changes applied"
    );
    report
}
