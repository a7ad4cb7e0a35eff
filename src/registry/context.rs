//! Runtime facilities handed to every handler lifecycle call.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

/// Opaque handle to shared runtime facilities (client pools, event senders).
///
/// The registry passes it through unchanged; only handlers look inside.
/// Cloning is cheap and every clone sees the same facilities.
#[derive(Clone, Default)]
pub struct TaskContext {
    facilities: Arc<DashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`TaskContext::insert`].
    pub fn with_facility<T: Any + Send + Sync>(self, facility: T) -> Self {
        self.insert(facility);
        self
    }

    /// Install a facility, replacing any previous one of the same type.
    pub fn insert<T: Any + Send + Sync>(&self, facility: T) {
        self.facilities.insert(TypeId::of::<T>(), Arc::new(facility));
    }

    /// Look up a facility by type.
    pub fn facility<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let entry = self.facilities.get(&TypeId::of::<T>())?;
        let facility = entry.value().clone();
        drop(entry);
        facility.downcast::<T>().ok()
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("facilities", &self.facilities.len())
            .finish()
    }
}
