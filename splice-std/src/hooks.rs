//! Hook registry.
//!
//! Records which methods are intercepted. Hooks only accumulate: an
//! instrumentation point installed in the target cannot be retracted short of
//! a full repatch, so there is no removal.

use parking_lot::RwLock;
use splice_core::{HookSet, MethodKey};
use std::collections::BTreeSet;

/// Process-lifetime set of intercepted methods.
#[derive(Debug, Default)]
pub struct HookRegistry {
    hooks: RwLock<BTreeSet<MethodKey>>,
}

impl HookRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as intercepted. Idempotent.
    pub fn register_hook(&self, key: MethodKey) {
        self.hooks.write().insert(key);
    }

    /// Mark every key in `hooks` as intercepted.
    pub fn register_all(&self, hooks: &HookSet) {
        let mut guard = self.hooks.write();
        for key in hooks {
            guard.insert(key.clone());
        }
    }

    /// Returns `true` if calls to `key` vector through the dispatcher.
    pub fn is_hooked(&self, key: &MethodKey) -> bool {
        self.hooks.read().contains(key)
    }

    /// Every intercepted method, sorted.
    pub fn all_hooked(&self) -> BTreeSet<MethodKey> {
        self.hooks.read().clone()
    }

    /// Number of intercepted methods.
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Returns `true` if nothing is intercepted.
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// Log every intercepted method.
    pub fn log_summary(&self) {
        let hooks = self.hooks.read();
        tracing::info!(count = hooks.len(), "registered hooks");
        for key in hooks.iter() {
            tracing::info!(method = %key, "hook");
        }
    }
}
