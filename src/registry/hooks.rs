//! Extension points invoked by the registry around handler transitions.

use crate::registry::handler::ManagedHandler;

/// Per-registry callbacks. Both default to no-ops.
pub trait RegistryHooks: Send + Sync {
    /// Runs after a successful init, before the handler is activated.
    fn post_init(&self, _handler: &ManagedHandler) {}

    /// Runs after a handler has been removed from the registry.
    fn post_unregister(&self, _handler: &ManagedHandler) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl RegistryHooks for NoopHooks {}
