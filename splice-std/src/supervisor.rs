//! Isolation supervisor.
//!
//! The single choke point for dispatcher-triggered unloads. Every quarantine
//! unloads through the registry and then rewrites the persisted order, so the
//! two never drift apart.

use crate::registry::{LoadedModule, ModuleHandle, SharedRegistry};
use splice_core::{DispatchFault, ExceptionSink, OrderStore};
use std::sync::Arc;

/// Removes failing modules and keeps the persisted order in step.
pub struct IsolationSupervisor {
    registry: SharedRegistry,
    store: Arc<dyn OrderStore>,
    sink: Arc<dyn ExceptionSink>,
}

impl IsolationSupervisor {
    /// Create a supervisor over `registry`.
    pub fn new(
        registry: SharedRegistry,
        store: Arc<dyn OrderStore>,
        sink: Arc<dyn ExceptionSink>,
    ) -> Self {
        Self {
            registry,
            store,
            sink,
        }
    }

    /// Unload every named module, then persist the new order.
    ///
    /// Never fails. Identifiers that are not loaded are ignored; when none
    /// of them was loaded the persisted order is left alone.
    pub fn quarantine<I, S>(&self, ids: I) -> Vec<ModuleHandle>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let removed: Vec<ModuleHandle> = {
            let mut registry = self.registry.write();
            ids.into_iter()
                .filter_map(|id| registry.unload(id.as_ref()))
                .collect()
        };

        if removed.is_empty() {
            return removed;
        }
        for module in &removed {
            tracing::warn!(module = module.id(), name = module.name(), "module quarantined");
        }
        self.persist_order();
        removed
    }

    /// Rewrite the persisted order from the registry. Failures are logged.
    pub fn persist_order(&self) {
        let order = self.registry.read().order();
        if let Err(err) = self.store.save(&order) {
            tracing::error!(error = %err, "failed to persist module order");
        }
    }

    /// Forward a dispatch fault to the exception sink if the module is not local.
    pub fn record(&self, module: &LoadedModule, fault: &DispatchFault) {
        self.log_module_error(module, fault);
    }

    /// Forward any error attributed to `module` to the exception sink if the
    /// module is not local.
    pub fn log_module_error(&self, module: &LoadedModule, error: &(dyn std::error::Error + 'static)) {
        if !module.origin().is_local() {
            self.sink.log(module.id(), error);
        }
    }

    /// The registry this supervisor unloads from.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }
}
