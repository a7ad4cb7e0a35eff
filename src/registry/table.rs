//! Concurrent lookup of live handlers.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::registry::handler::ManagedHandler;
use crate::registry::trace::TraceFilter;

/// A published handler together with its trace filter.
///
/// Keeping both in one entry means a trace filter can never outlive, or
/// appear before, the handler it belongs to.
#[derive(Clone)]
struct Entry {
    handler: Arc<ManagedHandler>,
    trace_filter: Option<Arc<dyn TraceFilter>>,
}

/// Name → active handler mapping read by the request path.
///
/// Writes come only from the registry. Reads take no caller-side lock and
/// observe the latest committed write for a name.
#[derive(Default)]
pub struct HandlerTable {
    entries: DashMap<String, Entry>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ManagedHandler>> {
        self.entries.get(name).map(|e| e.handler.clone())
    }

    /// Publish a handler, capturing its current trace filter.
    pub fn put(&self, name: impl Into<String>, handler: Arc<ManagedHandler>) {
        let trace_filter = handler.trace_filter();
        self.entries.insert(
            name.into(),
            Entry {
                handler,
                trace_filter,
            },
        );
    }

    pub fn remove(&self, name: &str) -> Option<Arc<ManagedHandler>> {
        self.entries.remove(name).map(|(_, e)| e.handler)
    }

    /// Remove the entry only if it still points at this exact instance.
    pub fn remove_instance(&self, handler: &Arc<ManagedHandler>) -> bool {
        self.entries
            .remove_if(handler.name(), |_, e| Arc::ptr_eq(&e.handler, handler))
            .is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Point-in-time copy of the published handlers.
    pub fn list(&self) -> Vec<Arc<ManagedHandler>> {
        self.entries.iter().map(|e| e.handler.clone()).collect()
    }

    pub fn trace_filter(&self, name: &str) -> Option<Arc<dyn TraceFilter>> {
        self.entries.get(name).and_then(|e| e.trace_filter.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot::default();
        for entry in self.entries.iter() {
            let name = entry.key().clone();
            if let Some(filter) = &entry.trace_filter {
                snapshot.trace_filters.insert(name.clone(), filter.clone());
            }
            snapshot.handlers.insert(name, entry.handler.clone());
        }
        snapshot
    }
}

/// Owned copy of the table's two mappings.
///
/// Every key of `trace_filters` is also a key of `handlers`.
#[derive(Default, Clone)]
pub struct RegistrySnapshot {
    pub handlers: HashMap<String, Arc<ManagedHandler>>,
    pub trace_filters: HashMap<String, Arc<dyn TraceFilter>>,
}
