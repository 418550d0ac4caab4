#![allow(dead_code)]

use splice::{
    BoxError, Dispatcher, ExecutionFault, HookRegistry, HookSet, InvocationContext,
    IsolationSupervisor, MethodKey, MethodSurface, Module, ModuleHandle, ModuleRegistry,
    ModuleSource, PatchLayer, SharedRegistry, Value,
    testing::{Journal, MemoryOrderStore, RecordingSink, ScriptedModule, ScriptedSource},
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

// ============================================================================
// Target Surface
// ============================================================================

pub const HOST_VERSION: u32 = 7;

pub fn surface() -> MethodSurface {
    ["Deck::draw", "Deck::shuffle", "Menu::open", "Hand::play"]
        .into_iter()
        .map(key)
        .collect()
}

pub fn key(name: &str) -> MethodKey {
    name.parse().unwrap()
}

// ============================================================================
// Dispatch Rig
// ============================================================================

/// Every dispatch component wired together over in-memory collaborators.
pub struct Rig {
    pub hooks: Arc<HookRegistry>,
    pub registry: SharedRegistry,
    pub patches: Arc<PatchLayer>,
    pub supervisor: Arc<IsolationSupervisor>,
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<MemoryOrderStore>,
    pub sink: Arc<RecordingSink>,
    pub journal: Journal,
}

impl Rig {
    pub fn new() -> Self {
        let hooks = Arc::new(HookRegistry::new());
        let registry = ModuleRegistry::new(surface(), HOST_VERSION, hooks.clone()).into_shared();
        let patches = Arc::new(PatchLayer::new(hooks.clone()));
        let store = Arc::new(MemoryOrderStore::new());
        let sink = Arc::new(RecordingSink::new());
        let supervisor = Arc::new(IsolationSupervisor::new(
            registry.clone(),
            store.clone(),
            sink.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            hooks.clone(),
            patches.clone(),
            supervisor.clone(),
        ));
        Self {
            hooks,
            registry,
            patches,
            supervisor,
            dispatcher,
            store,
            sink,
            journal: Journal::new(),
        }
    }

    /// A scripted module journaling into the rig's journal.
    pub fn module(&self, id: &str) -> ScriptedModule {
        ScriptedModule::new(id).with_journal(self.journal.clone())
    }

    /// Load `module` under `id`, hooking `hooks`.
    pub fn load(&self, id: &str, module: ScriptedModule, hooks: &[&str]) -> ModuleHandle {
        let source = ScriptedSource::new(id).with_hooks(hooks).with_module(module);
        self.registry.write().load(id, &source).unwrap()
    }

    /// Load any module type under `id`.
    pub fn load_custom<M: Module + Clone>(&self, id: &str, module: M, hooks: &[&str]) -> ModuleHandle {
        let source = CloneSource::new(id, module, hooks);
        self.registry.write().load(id, &source).unwrap()
    }

    pub fn order(&self) -> Vec<String> {
        self.registry.read().order()
    }

    /// Dispatch `method` with an original returning `"original"`.
    pub fn call(&self, method: &str) -> (Result<Value, ExecutionFault>, usize) {
        let original = OriginalCounter::new(Value::from("original"));
        let key = key(method);
        let result = self
            .dispatcher
            .intercept(InvocationContext::new(&key, &[]), |_| original.call());
        (result, original.count())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Stand-in for the unmodified target method.
#[derive(Clone)]
pub struct OriginalCounter {
    value: Value,
    calls: Arc<AtomicUsize>,
}

impl OriginalCounter {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call(&self) -> Result<Value, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.value.clone())
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// A source handing out clones of an arbitrary module.
pub struct CloneSource<M> {
    name: String,
    module: M,
    hooks: HookSet,
}

impl<M: Module + Clone> CloneSource<M> {
    pub fn new(name: &str, module: M, hooks: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            module,
            hooks: hooks.iter().map(|h| key(h)).collect(),
        }
    }
}

impl<M: Module + Clone> ModuleSource for CloneSource<M> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn version(&self) -> u32 {
        1
    }

    fn hooks(&self, _surface: &MethodSurface, _host_version: u32) -> Result<HookSet, BoxError> {
        Ok(self.hooks.clone())
    }

    fn construct(&self) -> Result<Box<dyn Module>, BoxError> {
        Ok(Box::new(self.module.clone()))
    }
}

/// Every permutation of `items`.
pub fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}
