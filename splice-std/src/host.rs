//! The mod host: single owner of every dispatch component.
//!
//! `ModHost` replaces process-wide statics. It builds the registries, the
//! dispatcher, the supervisor and crash recovery from a [`HostConfig`] and a
//! set of collaborators, and exposes the user-facing operations (load,
//! unload, reorder) that keep the persisted order in step.

use crate::{
    config::HostConfig,
    dispatch::{Dispatcher, InterceptionSwitch},
    hooks::HookRegistry,
    patches::PatchLayer,
    persistence::{FileMarker, FileOrderStore, reconcile},
    recovery::{CrashRecoveryController, RecoveryAction},
    registry::{ModuleHandle, ModuleRegistry, SharedRegistry},
    sink::TracingSink,
    supervisor::IsolationSupervisor,
};
use splice_core::{
    BoxError, ExceptionSink, ExecutionFault, HostFault, InvocationContext, LoadError,
    MethodSurface, ModuleSource, OrderStore, Patch, PersistenceError, Platform, RecoveryError,
    RecoveryMarker, Value,
};
use std::{fmt, sync::Arc};

/// A module package known to the host.
#[derive(Clone)]
pub struct InstalledModule {
    /// Stable identifier.
    pub id: String,
    /// Whether the user enabled it.
    pub enabled: bool,
    /// The resolved unit to load.
    pub source: Arc<dyn ModuleSource>,
}

impl InstalledModule {
    /// An enabled module.
    pub fn new(id: impl Into<String>, source: Arc<dyn ModuleSource>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            source,
        }
    }

    /// Mark the module as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl fmt::Debug for InstalledModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstalledModule")
            .field("id", &self.id)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`ModHost::boot`].
#[derive(Debug, Default)]
pub struct BootReport {
    /// Modules loaded, in order.
    pub loaded: Vec<String>,
    /// Modules that failed to load and were dropped from the order.
    pub failed: Vec<LoadError>,
}

/// Builder for [`ModHost`].
///
/// Order store and recovery marker default to files under the configured
/// state directory; the exception sink defaults to [`TracingSink`].
pub struct ModHostBuilder {
    config: HostConfig,
    surface: MethodSurface,
    platform: Arc<dyn Platform>,
    store: Option<Arc<dyn OrderStore>>,
    marker: Option<Arc<dyn RecoveryMarker>>,
    sink: Option<Arc<dyn ExceptionSink>>,
    patches: Vec<Arc<dyn Patch>>,
}

impl ModHostBuilder {
    /// Use a custom order store.
    pub fn with_store(mut self, store: Arc<dyn OrderStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom recovery marker.
    pub fn with_marker(mut self, marker: Arc<dyn RecoveryMarker>) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Use a custom exception sink.
    pub fn with_sink(mut self, sink: Arc<dyn ExceptionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Install a built-in patch.
    pub fn with_patch<P: Patch + 'static>(mut self, patch: P) -> Self {
        self.patches.push(Arc::new(patch));
        self
    }

    /// Build the host. Patches are installed immediately.
    pub fn build(self) -> ModHost {
        let store: Arc<dyn OrderStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileOrderStore::new(self.config.order_file())),
        };
        let marker: Arc<dyn RecoveryMarker> = match self.marker {
            Some(marker) => marker,
            None => Arc::new(FileMarker::new(self.config.marker_file())),
        };
        let sink: Arc<dyn ExceptionSink> = match self.sink {
            Some(sink) => sink,
            None => Arc::new(TracingSink),
        };

        let hooks = Arc::new(HookRegistry::new());
        let registry =
            ModuleRegistry::new(self.surface, self.config.host_version(), hooks.clone())
                .into_shared();
        let patches = Arc::new(PatchLayer::new(hooks.clone()));
        for patch in self.patches {
            patches.install_arc(patch);
        }

        let supervisor = Arc::new(IsolationSupervisor::new(
            registry.clone(),
            store.clone(),
            sink,
        ));
        let switch = InterceptionSwitch::default();
        let dispatcher = Dispatcher::new(
            registry.clone(),
            hooks.clone(),
            patches.clone(),
            supervisor.clone(),
        )
        .with_switch(switch.clone());
        let recovery = CrashRecoveryController::new(
            supervisor.clone(),
            switch,
            self.platform,
            marker,
            self.config.install_path(),
        );

        ModHost {
            config: self.config,
            hooks,
            registry,
            patches,
            supervisor,
            dispatcher,
            recovery,
            store,
        }
    }
}

/// Top-level owner of the interception core.
pub struct ModHost {
    config: HostConfig,
    hooks: Arc<HookRegistry>,
    registry: SharedRegistry,
    patches: Arc<PatchLayer>,
    supervisor: Arc<IsolationSupervisor>,
    dispatcher: Dispatcher,
    recovery: CrashRecoveryController,
    store: Arc<dyn OrderStore>,
}

impl ModHost {
    /// Start building a host for the target described by `config`.
    pub fn builder(
        config: HostConfig,
        surface: MethodSurface,
        platform: Arc<dyn Platform>,
    ) -> ModHostBuilder {
        ModHostBuilder {
            config,
            surface,
            platform,
            store: None,
            marker: None,
            sink: None,
            patches: Vec::new(),
        }
    }

    /// Load the installed modules in persisted order.
    ///
    /// The stored order is reconciled with `installed` first. Enabled modules
    /// that fail to load are dropped and reported; the resulting order is
    /// written back. No registry lock is held while module code runs, so
    /// constructors may call hooked methods.
    pub fn boot(&self, installed: &[InstalledModule]) -> Result<BootReport, PersistenceError> {
        let order = reconcile(self.store.load()?, installed);
        let mut report = BootReport::default();

        for id in &order {
            let Some(module) = installed.iter().find(|m| &m.id == id) else {
                continue;
            };
            if !module.enabled {
                continue;
            }
            match ModuleRegistry::load_shared(&self.registry, id.clone(), &*module.source) {
                Ok(handle) => report.loaded.push(handle.id().to_string()),
                Err(err) => {
                    tracing::warn!(module = %id, error = %err, "module failed to load");
                    report.failed.push(err);
                }
            }
        }

        self.store.save(&self.registry.read().order())?;
        tracing::info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "modules booted"
        );
        self.hooks.log_summary();
        Ok(report)
    }

    /// Load one more module at the end of the order.
    pub fn load(&self, module: &InstalledModule) -> Result<ModuleHandle, LoadError> {
        let handle =
            ModuleRegistry::load_shared(&self.registry, module.id.clone(), &*module.source)?;
        self.supervisor.persist_order();
        Ok(handle)
    }

    /// Unload a module at the user's request. No-op if absent.
    pub fn unload(&self, id: &str) -> Option<ModuleHandle> {
        let removed = self.registry.write().unload(id);
        if removed.is_some() {
            self.supervisor.persist_order();
        }
        removed
    }

    /// Raise a module's priority by one.
    pub fn move_up(&self, id: &str) -> bool {
        let moved = self.registry.write().move_up(id);
        if moved {
            self.supervisor.persist_order();
        }
        moved
    }

    /// Lower a module's priority by one.
    pub fn move_down(&self, id: &str) -> bool {
        let moved = self.registry.write().move_down(id);
        if moved {
            self.supervisor.persist_order();
        }
        moved
    }

    /// Current module order.
    pub fn order(&self) -> Vec<String> {
        self.registry.read().order()
    }

    /// Dispatch an intercepted call.
    pub fn intercept<F>(
        &self,
        ctx: InvocationContext<'_>,
        original: F,
    ) -> Result<Value, ExecutionFault>
    where
        F: FnOnce(&InvocationContext<'_>) -> Result<Value, BoxError>,
    {
        self.dispatcher.intercept(ctx, original)
    }

    /// Hand an uncaught fault to crash recovery.
    pub fn report_fault(&self, fault: HostFault) -> Result<RecoveryAction, RecoveryError> {
        self.recovery.report(fault)
    }

    /// Mark startup as successful, clearing the crash marker.
    pub fn startup_complete(&self) -> Result<(), RecoveryError> {
        self.recovery.startup_complete()
    }

    /// The configuration the host was built with.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// The hook registry.
    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    /// The shared module registry.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// The patch layer.
    pub fn patches(&self) -> &Arc<PatchLayer> {
        &self.patches
    }

    /// The isolation supervisor.
    pub fn supervisor(&self) -> &Arc<IsolationSupervisor> {
        &self.supervisor
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Crash recovery.
    pub fn recovery(&self) -> &CrashRecoveryController {
        &self.recovery
    }
}
