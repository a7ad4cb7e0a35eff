//! Error types for the handler registry and the handlers it drives.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a handler implementation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler's configuration could not be read or is invalid.
    #[error("invalid handler configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The handler is not able to serve traffic right now.
    #[error("handler unavailable: {0}")]
    Unavailable(String),

    /// An upstream the handler depends on failed.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// The handler does not accept this kind of request.
    #[error("handler {0} does not serve requests")]
    Unsupported(String),

    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl HandlerError {
    /// Plain failure with a message and no underlying cause.
    pub fn msg(message: impl Into<String>) -> Self {
        HandlerError::Failed {
            message: message.into(),
            source: None,
        }
    }

    /// Failure wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        HandlerError::Failed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// The lifecycle call that was running when a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStep {
    Init,
    Activate,
    Deactivate,
    Shutdown,
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            LifecycleStep::Init => "init",
            LifecycleStep::Activate => "activate",
            LifecycleStep::Deactivate => "deactivate",
            LifecycleStep::Shutdown => "shutdown",
        };
        f.write_str(step)
    }
}

/// What asked for a handler to be cycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    /// Programmatic reinitialization.
    Reinit,
    /// Administrative reload.
    Reload,
}

impl fmt::Display for CycleTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleTrigger::Reinit => f.write_str("reinit"),
            CycleTrigger::Reload => f.write_str("reload"),
        }
    }
}

/// Errors surfaced by [`HandlerRegistry`](crate::registry::HandlerRegistry).
///
/// Only `Veto`, `Resolution`, `PoolTermination` and `Conflict` abort `init`; the other
/// variants are scoped to a single named handler.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("error initializing vetoing {kind} handler: {handler}")]
    Veto {
        handler: String,
        kind: String,
        #[source]
        cause: Option<Arc<HandlerError>>,
    },

    #[error("could not resolve handler instances for descriptor {descriptor}")]
    Resolution {
        descriptor: String,
        #[source]
        source: HandlerError,
    },

    #[error("handler init pool terminated abnormally while initializing {handler}: {reason}")]
    PoolTermination { handler: String, reason: String },

    /// A different instance already holds the name and is live or mid-transition.
    #[error("handler {handler} is already registered as a live instance (version {active_version})")]
    Conflict { handler: String, active_version: String },

    #[error("error during {trigger} of {kind} handler {handler} at {step}")]
    Cycle {
        handler: String,
        kind: String,
        trigger: CycleTrigger,
        step: LifecycleStep,
        #[source]
        source: Arc<HandlerError>,
    },

    #[error("failed to shut down {kind} handler {handler} at {step}")]
    Shutdown {
        handler: String,
        kind: String,
        step: LifecycleStep,
        #[source]
        source: HandlerError,
    },
}

impl RegistryError {
    /// Name of the handler the error is about.
    pub fn handler(&self) -> &str {
        match self {
            RegistryError::Veto { handler, .. }
            | RegistryError::PoolTermination { handler, .. }
            | RegistryError::Cycle { handler, .. }
            | RegistryError::Shutdown { handler, .. }
            | RegistryError::Conflict { handler, .. } => handler,
            RegistryError::Resolution { descriptor, .. } => descriptor,
        }
    }

    /// Whether the error aborts a registry bring-up.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RegistryError::Veto { .. }
                | RegistryError::Resolution { .. }
                | RegistryError::PoolTermination { .. }
                | RegistryError::Conflict { .. }
        )
    }
}

/// Render an error followed by every cause in its source chain.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut current = err.source();
    while let Some(cause) = current {
        chain.push(cause.to_string());
        current = cause.source();
    }
    chain
}
