//! Registry of open contexts.
//!
//! The registry holds weak references in registration order, so it never
//! keeps a context alive and can enumerate or finalize every context the
//! runtime opened.

use std::fmt;
use std::sync::Weak;

use indexmap::IndexMap;
use parking_lot::Mutex;
use quarry_core::ContextId;

use crate::context::{Context, ContextInner};

/// Ordered set of registered contexts.
#[derive(Default)]
pub struct ContextRegistry {
    contexts: Mutex<IndexMap<ContextId, Weak<ContextInner>>>,
}

impl ContextRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, ctx: &Context) {
        self.contexts.lock().insert(ctx.id(), ctx.downgrade());
    }

    /// Remove `id`. Returns whether it was registered.
    pub fn deregister(&self, id: ContextId) -> bool {
        self.contexts.lock().shift_remove(&id).is_some()
    }

    /// Ids of registered contexts in registration order.
    pub fn ids(&self) -> Vec<ContextId> {
        self.contexts.lock().keys().copied().collect()
    }

    /// Number of registered contexts.
    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Whether no context is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles to every registered context that is still alive.
    pub fn live(&self) -> Vec<Context> {
        let weak: Vec<_> = self.contexts.lock().values().cloned().collect();
        weak.iter()
            .filter_map(Weak::upgrade)
            .map(Context::from_inner)
            .collect()
    }

    /// Remove every entry, returning live handles in registration order.
    pub(crate) fn drain(&self) -> Vec<Context> {
        let weak: Vec<_> = std::mem::take(&mut *self.contexts.lock())
            .into_values()
            .collect();
        weak.iter()
            .filter_map(Weak::upgrade)
            .map(Context::from_inner)
            .collect()
    }
}

impl fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
