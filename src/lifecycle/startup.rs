//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the task context shared by every handler
//! - Turn `[[handlers]]` entries into registrations
//! - Bring the registry up, tearing it down again on a fatal error
//!
//! # Design Decisions
//! - Fail fast: a veto aborts startup
//! - Listeners start after this returns (traffic only when ready)

use std::sync::Arc;

use thiserror::Error;

use crate::config::ProxyConfig;
use crate::handlers::http_proxy::UpstreamClient;
use crate::handlers::HandlerCatalog;
use crate::registry::{HandlerError, HandlerRegistry, RegistryError, TaskContext};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid handler configuration")]
    Catalog(#[from] HandlerError),

    #[error("handler registry failed to start")]
    Registry(#[from] RegistryError),
}

/// Task context carrying the facilities built-in handlers look for.
pub fn task_context() -> TaskContext {
    TaskContext::new().with_facility(UpstreamClient::new())
}

/// Create the registry and initialize every configured handler.
///
/// On a fatal init error the handlers that did come up are shut down
/// before the error is returned.
pub async fn start_handlers(
    config: &ProxyConfig,
    catalog: &HandlerCatalog,
    ctx: &TaskContext,
) -> Result<Arc<HandlerRegistry>, StartupError> {
    let registry = Arc::new(HandlerRegistry::new(config.registry.settings()));
    let registrations = catalog.registrations(&config.handlers)?;

    match registry.init(registrations, ctx).await {
        Ok(inited) => {
            tracing::info!(
                configured = config.handlers.len(),
                active = inited.len(),
                "Handlers initialized"
            );
            Ok(registry)
        }
        Err(e) => {
            tracing::error!(handler = e.handler(), error = %e, "Handler startup aborted");
            registry.shutdown(ctx).await;
            Err(e.into())
        }
    }
}
