//! Module registry.
//!
//! Owns the loaded modules and their order. The order is the storage order
//! of a single `Vec`, so the module collection and the module order can
//! never disagree.

use crate::{guard::contain, hooks::HookRegistry, persistence::is_storable_id};
use parking_lot::RwLock;
use splice_core::{
    Capabilities, HookError, HookSet, LoadError, MethodKey, MethodSurface, Module, ModuleOrigin,
    ModuleSource,
};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/// A handle for observing whether a module is still loaded.
///
/// Calls capture the module order when they start; a nested call may unload
/// a module the outer call still holds. The outer call checks this flag
/// before every invocation.
#[derive(Debug, Clone)]
pub struct ActiveHandle(Arc<AtomicBool>);

impl ActiveHandle {
    /// Create a new handle with the given initial state.
    pub fn new(active: bool) -> Self {
        Self(Arc::new(AtomicBool::new(active)))
    }

    /// Check if the module is still loaded.
    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Mark the module as unloaded.
    pub fn deactivate(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for ActiveHandle {
    fn default() -> Self {
        Self::new(true)
    }
}

/// A module admitted by the registry together with its metadata.
pub struct LoadedModule {
    id: String,
    name: String,
    version: u32,
    origin: ModuleOrigin,
    hooks: HookSet,
    capabilities: Capabilities,
    module: Arc<dyn Module>,
    active: ActiveHandle,
}

impl LoadedModule {
    /// Stable identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name reported by the source.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version reported by the source.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Where the module was installed from.
    pub fn origin(&self) -> &ModuleOrigin {
        &self.origin
    }

    /// Methods the module hooks.
    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    /// Phases the module takes part in.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// The module instance.
    pub fn module(&self) -> &dyn Module {
        &*self.module
    }

    /// Returns `true` if the module hooks `key` and has every capability in `cap`.
    pub fn participates(&self, key: &MethodKey, cap: Capabilities) -> bool {
        self.capabilities.contains(cap) && self.hooks.contains(key)
    }

    /// Check if the module is still loaded.
    pub fn is_active(&self) -> bool {
        self.active.is_active()
    }

    /// Get a handle observing this module's loaded state.
    pub fn active_handle(&self) -> ActiveHandle {
        self.active.clone()
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("origin", &self.origin)
            .field("hooks", &self.hooks.len())
            .field("capabilities", &self.capabilities)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Shared handle to a loaded module.
pub type ModuleHandle = Arc<LoadedModule>;

/// The registry as shared between the dispatcher, the supervisor and the host.
///
/// The lock is only held across registry reads and mutations, never while
/// module code runs.
pub type SharedRegistry = Arc<RwLock<ModuleRegistry>>;

/// Ordered collection of loaded modules.
///
/// Position in the order is priority: earlier modules win replacement
/// elections and are notified first.
pub struct ModuleRegistry {
    modules: Vec<ModuleHandle>,
    surface: Arc<MethodSurface>,
    host_version: u32,
    hooks: Arc<HookRegistry>,
}

impl ModuleRegistry {
    /// An empty registry validating against `surface`.
    pub fn new(surface: MethodSurface, host_version: u32, hooks: Arc<HookRegistry>) -> Self {
        Self {
            modules: Vec::new(),
            surface: Arc::new(surface),
            host_version,
            hooks,
        }
    }

    /// Admit a module, appending it to the order.
    ///
    /// The constructor runs exactly once. Loading is all-or-nothing: on any
    /// error the registry and the hook registry are left untouched.
    pub fn load(
        &mut self,
        id: impl Into<String>,
        source: &dyn ModuleSource,
    ) -> Result<ModuleHandle, LoadError> {
        let id = id.into();
        self.check_admissible(&id)?;
        let prepared = prepare(id, source, &self.surface, self.host_version)?;
        self.admit(prepared)
    }

    /// Admit a module into a shared registry.
    ///
    /// Module code (constructor, hook query, metadata) runs without the
    /// registry lock, so it may dispatch hooked calls. The write lock is
    /// taken only to append the prepared module.
    pub fn load_shared(
        registry: &SharedRegistry,
        id: impl Into<String>,
        source: &dyn ModuleSource,
    ) -> Result<ModuleHandle, LoadError> {
        let id = id.into();
        let (surface, host_version) = {
            let guard = registry.read();
            guard.check_admissible(&id)?;
            (Arc::clone(&guard.surface), guard.host_version)
        };
        let prepared = prepare(id, source, &surface, host_version)?;
        registry.write().admit(prepared)
    }

    fn check_admissible(&self, id: &str) -> Result<(), LoadError> {
        if !is_storable_id(id) {
            return Err(LoadError::InvalidId(id.to_string()));
        }
        if self.contains(id) {
            return Err(LoadError::AlreadyLoaded(id.to_string()));
        }
        Ok(())
    }

    fn admit(&mut self, prepared: Prepared) -> Result<ModuleHandle, LoadError> {
        // Another load may have admitted the same id since preparation.
        if self.contains(&prepared.id) {
            return Err(LoadError::AlreadyLoaded(prepared.id));
        }

        self.hooks.register_all(&prepared.hooks);
        let handle = Arc::new(LoadedModule {
            id: prepared.id,
            name: prepared.name,
            version: prepared.version,
            origin: prepared.origin,
            hooks: prepared.hooks,
            capabilities: prepared.capabilities,
            module: Arc::from(prepared.module),
            active: ActiveHandle::default(),
        });

        tracing::debug!(
            module = %handle.id,
            name = %handle.name,
            version = handle.version,
            hooks = handle.hooks.len(),
            "module loaded"
        );
        self.modules.push(Arc::clone(&handle));
        Ok(handle)
    }

    /// Remove a module and its position. No-op if absent.
    pub fn unload(&mut self, id: &str) -> Option<ModuleHandle> {
        let index = self.position(id)?;
        let handle = self.modules.remove(index);
        handle.active.deactivate();
        tracing::debug!(module = %id, "module unloaded");
        Some(handle)
    }

    /// Swap a module with its predecessor. Returns `false` at the boundary
    /// or if the module is absent.
    pub fn move_up(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(index) if index > 0 => {
                self.modules.swap(index, index - 1);
                true
            }
            _ => false,
        }
    }

    /// Swap a module with its successor. Returns `false` at the boundary
    /// or if the module is absent.
    pub fn move_down(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(index) if index + 1 < self.modules.len() => {
                self.modules.swap(index, index + 1);
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the modules in dispatch order.
    pub fn ordered_modules(&self) -> Vec<ModuleHandle> {
        self.modules.clone()
    }

    /// Identifiers in dispatch order.
    pub fn order(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.id.clone()).collect()
    }

    /// Look up a module by identifier.
    pub fn get(&self, id: &str) -> Option<&ModuleHandle> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Zero-based position of a module in the order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.id == id)
    }

    /// Returns `true` if a module with this identifier is loaded.
    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Number of loaded modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if nothing is loaded.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Wrap the registry for sharing.
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// The method surface modules are validated against.
    pub fn surface(&self) -> &MethodSurface {
        &self.surface
    }

    /// The host version passed to hook queries.
    pub fn host_version(&self) -> u32 {
        self.host_version
    }
}

/// A constructed, validated module not yet in any registry.
struct Prepared {
    id: String,
    name: String,
    version: u32,
    origin: ModuleOrigin,
    hooks: HookSet,
    capabilities: Capabilities,
    module: Box<dyn Module>,
}

fn construction_failed(id: &str) -> impl FnOnce(HookError) -> LoadError {
    let id = id.to_string();
    move |source| LoadError::ConstructionFailed { id, source }
}

/// Run every piece of module code a load needs, each one contained.
fn prepare(
    id: String,
    source: &dyn ModuleSource,
    surface: &MethodSurface,
    host_version: u32,
) -> Result<Prepared, LoadError> {
    let module = contain(|| source.construct()).map_err(construction_failed(&id))?;
    let (name, version, origin) =
        contain(|| Ok((source.name(), source.version(), source.origin())))
            .map_err(construction_failed(&id))?;
    let capabilities =
        contain(|| Ok(module.capabilities())).map_err(construction_failed(&id))?;

    let hooks = contain(|| source.hooks(surface, host_version)).map_err(|err| {
        LoadError::InvalidHooks {
            id: id.clone(),
            reason: format!("hook query failed: {err}"),
        }
    })?;

    let missing = surface.missing(&hooks);
    if !missing.is_empty() {
        let names: Vec<String> = missing.iter().map(|k| k.to_string()).collect();
        return Err(LoadError::InvalidHooks {
            id,
            reason: format!("unknown methods: {}", names.join(", ")),
        });
    }

    Ok(Prepared {
        id,
        name,
        version,
        origin,
        hooks,
        capabilities,
        module,
    })
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("order", &self.order())
            .field("host_version", &self.host_version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;

    fn surface() -> MethodSurface {
        MethodSurface::new()
            .with(MethodKey::new("Deck", "draw"))
            .with(MethodKey::new("Deck", "shuffle"))
    }

    fn registry() -> (ModuleRegistry, Arc<HookRegistry>) {
        let hooks = Arc::new(HookRegistry::new());
        (ModuleRegistry::new(surface(), 1, hooks.clone()), hooks)
    }

    fn source(hooks: &[&str]) -> ScriptedSource {
        ScriptedSource::new("test").with_hooks(hooks)
    }

    #[test]
    fn load_appends_and_registers_hooks() {
        let (mut registry, hooks) = registry();
        registry.load("a", &source(&["Deck::draw"])).unwrap();
        registry.load("b", &source(&["Deck::shuffle"])).unwrap();

        assert_eq!(registry.order(), vec!["a", "b"]);
        assert!(hooks.is_hooked(&MethodKey::new("Deck", "draw")));
        assert!(hooks.is_hooked(&MethodKey::new("Deck", "shuffle")));
    }

    #[test]
    fn constructor_runs_once() {
        let (mut registry, _) = registry();
        let src = source(&["Deck::draw"]);
        registry.load("a", &src).unwrap();
        assert_eq!(src.constructed(), 1);
    }

    #[test]
    fn construction_failure_leaves_nothing() {
        let (mut registry, hooks) = registry();
        let err = registry
            .load("a", &source(&["Deck::draw"]).failing_construct())
            .unwrap_err();

        assert!(matches!(err, LoadError::ConstructionFailed { .. }));
        assert!(registry.is_empty());
        assert!(hooks.is_empty());
    }

    #[test]
    fn unknown_hooks_reject_the_whole_module() {
        let (mut registry, hooks) = registry();
        let err = registry
            .load("a", &source(&["Deck::draw", "Hand::play"]))
            .unwrap_err();

        match err {
            LoadError::InvalidHooks { id, reason } => {
                assert_eq!(id, "a");
                assert!(reason.contains("Hand::play"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(registry.is_empty());
        assert!(!hooks.is_hooked(&MethodKey::new("Deck", "draw")));
    }

    #[test]
    fn failing_hook_query_is_invalid_hooks() {
        let (mut registry, _) = registry();
        let err = registry
            .load("a", &source(&[]).failing_hooks())
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidHooks { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let (mut registry, _) = registry();
        registry.load("a", &source(&[])).unwrap();
        let err = registry.load("a", &source(&[])).unwrap_err();
        assert!(matches!(err, LoadError::AlreadyLoaded(ref id) if id == "a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unload_deactivates_and_is_idempotent() {
        let (mut registry, _) = registry();
        let handle = registry.load("a", &source(&[])).unwrap();

        assert!(registry.unload("a").is_some());
        assert!(!handle.is_active());
        assert!(registry.unload("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn moves_swap_neighbours_and_stop_at_boundaries() {
        let (mut registry, _) = registry();
        for id in ["a", "b", "c"] {
            registry.load(id, &source(&[])).unwrap();
        }

        assert!(!registry.move_up("a"));
        assert!(!registry.move_down("c"));
        assert!(!registry.move_up("missing"));
        assert_eq!(registry.order(), vec!["a", "b", "c"]);

        assert!(registry.move_up("c"));
        assert_eq!(registry.order(), vec!["a", "c", "b"]);

        assert!(registry.move_down("a"));
        assert_eq!(registry.order(), vec!["c", "a", "b"]);
    }

    struct PanickyCapabilities;

    impl Module for PanickyCapabilities {
        fn capabilities(&self) -> Capabilities {
            panic!("capabilities unavailable")
        }
    }

    /// Builds a module through a caller-supplied constructor.
    struct FnSource<F>(F);

    impl<F> ModuleSource for FnSource<F>
    where
        F: Fn() -> Result<Box<dyn Module>, splice_core::BoxError> + Send + Sync,
    {
        fn name(&self) -> String {
            "fn-source".into()
        }

        fn version(&self) -> u32 {
            1
        }

        fn hooks(
            &self,
            _surface: &MethodSurface,
            _host_version: u32,
        ) -> Result<HookSet, splice_core::BoxError> {
            Ok([MethodKey::new("Deck", "draw")].into_iter().collect())
        }

        fn construct(&self) -> Result<Box<dyn Module>, splice_core::BoxError> {
            (self.0)()
        }
    }

    #[test]
    fn panicking_capabilities_fail_the_load() {
        let (mut registry, hooks) = registry();
        let source = FnSource(|| Ok(Box::new(PanickyCapabilities) as Box<dyn Module>));

        let err = registry.load("a", &source).unwrap_err();

        match err {
            LoadError::ConstructionFailed { id, source } => {
                assert_eq!(id, "a");
                assert!(source.is_panic());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(registry.is_empty());
        assert!(hooks.is_empty());
    }

    #[test]
    fn unstorable_ids_are_rejected_before_construction() {
        let (mut registry, _) = registry();
        let src = source(&[]);
        for bad in ["", " a", "#a", "a\nb"] {
            let err = registry.load(bad, &src).unwrap_err();
            assert!(matches!(err, LoadError::InvalidId(ref id) if id == bad));
        }
        assert_eq!(src.constructed(), 0);
        assert!(registry.load("a=b", &src).is_ok());
    }

    #[test]
    fn shared_load_releases_the_lock_while_constructing() {
        let (registry, hooks) = registry();
        let shared = registry.into_shared();
        shared.write().load("first", &source(&["Deck::draw"])).unwrap();

        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let source = {
            let shared = shared.clone();
            let seen = seen.clone();
            FnSource(move || {
                // Reads and writes elsewhere must not block here.
                seen.store(shared.read().len(), Ordering::SeqCst);
                let _ = shared.try_write().ok_or("registry locked")?;
                Ok(Box::new(Inert) as Box<dyn Module>)
            })
        };

        let handle = ModuleRegistry::load_shared(&shared, "second", &source).unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(handle.id(), "second");
        assert_eq!(shared.read().order(), vec!["first", "second"]);
        assert!(hooks.is_hooked(&MethodKey::new("Deck", "draw")));
    }

    #[test]
    fn shared_load_rejects_duplicates_without_constructing() {
        let (registry, _) = registry();
        let shared = registry.into_shared();
        let src = source(&[]);
        ModuleRegistry::load_shared(&shared, "a", &src).unwrap();

        let err = ModuleRegistry::load_shared(&shared, "a", &src).unwrap_err();

        assert!(matches!(err, LoadError::AlreadyLoaded(_)));
        assert_eq!(src.constructed(), 1);
    }

    struct Inert;

    impl Module for Inert {}
}
