//! Testing utilities for Splice.
//!
//! In-memory stand-ins for every collaborator plus scriptable modules and
//! patches, so dispatch and recovery can be exercised without a target
//! process.
//!
//! - [`ScriptedModule`]: a module whose votes, faults and rewrites are set up front
//! - [`ScriptedSource`]: a [`ModuleSource`] producing a [`ScriptedModule`]
//! - [`Journal`]: a shared call log used to assert cross-module ordering
//! - [`StaticPatch`]: a patch with a fixed outcome
//! - [`MemoryOrderStore`], [`MemoryMarker`], [`RecordingPlatform`], [`RecordingSink`]

use parking_lot::Mutex;
use splice_core::{
    BoxError, Capabilities, ExceptionSink, HookSet, InvocationContext, MethodKey, MethodSurface,
    Module, ModuleOrigin, ModuleSource, OrderStore, Patch, PatchOutcome, PersistenceError, Phase,
    Platform, RecoveryMarker, Value,
};
use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

// ============================================================================
// Journal
// ============================================================================

/// A shared, ordered log of module calls.
///
/// Entries are formatted as `"<label>:<phase>"`, e.g. `"a:before"`.
#[derive(Clone, Default, Debug)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn record(&self, label: &str, phase: Phase) {
        self.entries.lock().push(format!("{label}:{phase}"));
    }

    /// All entries in call order.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Entries for one phase, as labels.
    pub fn labels(&self, phase: Phase) -> Vec<String> {
        let suffix = format!(":{phase}");
        self.entries
            .lock()
            .iter()
            .filter_map(|e| e.strip_suffix(&suffix).map(str::to_string))
            .collect()
    }

    /// Number of entries for a label in a phase.
    pub fn count(&self, label: &str, phase: Phase) -> usize {
        let entry = format!("{label}:{phase}");
        self.entries.lock().iter().filter(|e| **e == entry).count()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

// ============================================================================
// Scripted Module
// ============================================================================

/// A module whose behaviour is fixed at construction.
///
/// Clones share the journal and the list of observed results.
///
/// # Example
///
/// ```rust,ignore
/// let journal = Journal::new();
/// let module = ScriptedModule::new("a")
///     .with_journal(journal.clone())
///     .replacing(Value::Int(7))
///     .failing_in(Phase::After);
/// ```
#[derive(Clone, Debug)]
pub struct ScriptedModule {
    label: String,
    journal: Journal,
    capabilities: Capabilities,
    vote: bool,
    replacement: Value,
    rewrite: Option<Value>,
    failing: HashSet<Phase>,
    panicking: HashSet<Phase>,
    observed: Arc<Mutex<Vec<Value>>>,
}

impl ScriptedModule {
    /// An inert module that journals every call under `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            journal: Journal::new(),
            capabilities: Capabilities::all(),
            vote: false,
            replacement: Value::Unit,
            rewrite: None,
            failing: HashSet::new(),
            panicking: HashSet::new(),
            observed: Arc::default(),
        }
    }

    /// Journal into a shared log.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Declare a capability set.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Vote to replace and return `value` from the replacement.
    pub fn replacing(mut self, value: impl Into<Value>) -> Self {
        self.vote = true;
        self.replacement = value.into();
        self
    }

    /// Vote to replace without changing the replacement value.
    pub fn voting(mut self, vote: bool) -> Self {
        self.vote = vote;
        self
    }

    /// Overwrite the result in the after phase.
    pub fn rewriting(mut self, value: impl Into<Value>) -> Self {
        self.rewrite = Some(value.into());
        self
    }

    /// Return an error in `phase`.
    pub fn failing_in(mut self, phase: Phase) -> Self {
        self.failing.insert(phase);
        self
    }

    /// Panic in `phase`.
    pub fn panicking_in(mut self, phase: Phase) -> Self {
        self.panicking.insert(phase);
        self
    }

    /// The label used in journal entries.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The journal this module writes to.
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Number of calls in `phase`.
    pub fn calls(&self, phase: Phase) -> usize {
        self.journal.count(&self.label, phase)
    }

    /// Results seen in the after phase, before any rewrite.
    pub fn observed(&self) -> Vec<Value> {
        self.observed.lock().clone()
    }

    fn enter(&self, phase: Phase) -> Result<(), BoxError> {
        self.journal.record(&self.label, phase);
        if self.panicking.contains(&phase) {
            panic!("{} panicked in {phase}", self.label);
        }
        if self.failing.contains(&phase) {
            return Err(format!("{} failed in {phase}", self.label).into());
        }
        Ok(())
    }
}

impl Module for ScriptedModule {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn wants_to_replace(&self, _ctx: &InvocationContext<'_>) -> Result<bool, BoxError> {
        self.enter(Phase::Election)?;
        Ok(self.vote)
    }

    fn before_invoke(&self, _ctx: &InvocationContext<'_>) -> Result<(), BoxError> {
        self.enter(Phase::Before)
    }

    fn replace_method(&self, _ctx: &InvocationContext<'_>) -> Result<Value, BoxError> {
        self.enter(Phase::Replace)?;
        Ok(self.replacement.clone())
    }

    fn after_invoke(&self, _ctx: &InvocationContext<'_>, result: &mut Value) -> Result<(), BoxError> {
        self.observed.lock().push(result.clone());
        if let Some(rewrite) = &self.rewrite {
            *result = rewrite.clone();
        }
        self.enter(Phase::After)
    }
}

// ============================================================================
// Scripted Source
// ============================================================================

/// A [`ModuleSource`] that hands out clones of a [`ScriptedModule`].
#[derive(Clone, Debug)]
pub struct ScriptedSource {
    name: String,
    version: u32,
    hooks: Vec<String>,
    origin: ModuleOrigin,
    module: ScriptedModule,
    fail_construct: bool,
    fail_hooks: bool,
    constructed: Arc<AtomicUsize>,
}

impl ScriptedSource {
    /// A source for an inert module named `name` that hooks nothing.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            module: ScriptedModule::new(name.clone()),
            name,
            version: 1,
            hooks: Vec::new(),
            origin: ModuleOrigin::Local,
            fail_construct: false,
            fail_hooks: false,
            constructed: Arc::default(),
        }
    }

    /// Declare hooks as `"Type::method"` strings.
    pub fn with_hooks(mut self, hooks: &[&str]) -> Self {
        self.hooks = hooks.iter().map(|h| h.to_string()).collect();
        self
    }

    /// Use `module` as the constructed instance.
    pub fn with_module(mut self, module: ScriptedModule) -> Self {
        self.module = module;
        self
    }

    /// Set the module version.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set where the module came from.
    pub fn with_origin(mut self, origin: ModuleOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Make construction fail.
    pub fn failing_construct(mut self) -> Self {
        self.fail_construct = true;
        self
    }

    /// Make the hook query fail.
    pub fn failing_hooks(mut self) -> Self {
        self.fail_hooks = true;
        self
    }

    /// How many times construction was attempted.
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    /// The module template.
    pub fn module(&self) -> &ScriptedModule {
        &self.module
    }
}

impl ModuleSource for ScriptedSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn hooks(&self, _surface: &MethodSurface, _host_version: u32) -> Result<HookSet, BoxError> {
        if self.fail_hooks {
            return Err(format!("{} cannot list hooks", self.name).into());
        }
        self.hooks
            .iter()
            .map(|h| h.parse::<MethodKey>().map_err(BoxError::from))
            .collect()
    }

    fn construct(&self) -> Result<Box<dyn Module>, BoxError> {
        self.constructed.fetch_add(1, Ordering::SeqCst);
        if self.fail_construct {
            return Err(format!("{} failed to construct", self.name).into());
        }
        Ok(Box::new(self.module.clone()))
    }

    fn origin(&self) -> ModuleOrigin {
        self.origin.clone()
    }
}

// ============================================================================
// Static Patch
// ============================================================================

#[derive(Clone, Debug)]
enum PatchBehavior {
    Handle(Value),
    Decline,
    Fail,
}

/// A patch with a fixed outcome. Clones share the call counter.
#[derive(Clone, Debug)]
pub struct StaticPatch {
    methods: HookSet,
    behavior: PatchBehavior,
    calls: Arc<AtomicUsize>,
}

impl StaticPatch {
    fn build(methods: &[&str], behavior: PatchBehavior) -> Self {
        Self {
            methods: methods.iter().filter_map(|m| m.parse().ok()).collect(),
            behavior,
            calls: Arc::default(),
        }
    }

    /// A patch that handles `methods` by returning `value`.
    pub fn handling(methods: &[&str], value: impl Into<Value>) -> Self {
        Self::build(methods, PatchBehavior::Handle(value.into()))
    }

    /// A patch that always declines.
    pub fn declining(methods: &[&str]) -> Self {
        Self::build(methods, PatchBehavior::Decline)
    }

    /// A patch that always errors.
    pub fn failing(methods: &[&str]) -> Self {
        Self::build(methods, PatchBehavior::Fail)
    }

    /// Number of intercept calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Patch for StaticPatch {
    fn name(&self) -> &str {
        "static-patch"
    }

    fn patched_methods(&self) -> HookSet {
        self.methods.clone()
    }

    fn intercept(&self, _ctx: &InvocationContext<'_>) -> Result<PatchOutcome, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            PatchBehavior::Handle(value) => Ok(PatchOutcome::Handled(value.clone())),
            PatchBehavior::Decline => Ok(PatchOutcome::Declined),
            PatchBehavior::Fail => Err("patch failed".into()),
        }
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// An [`OrderStore`] held in memory.
#[derive(Default, Debug)]
pub struct MemoryOrderStore {
    order: Mutex<Vec<String>>,
    saves: AtomicUsize,
}

impl MemoryOrderStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with `order`.
    pub fn with_order(order: &[&str]) -> Self {
        Self {
            order: Mutex::new(order.iter().map(|id| id.to_string()).collect()),
            saves: AtomicUsize::new(0),
        }
    }

    /// The most recently stored order.
    pub fn saved(&self) -> Vec<String> {
        self.order.lock().clone()
    }

    /// Number of saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl OrderStore for MemoryOrderStore {
    fn load(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(self.order.lock().clone())
    }

    fn save(&self, order: &[String]) -> Result<(), PersistenceError> {
        *self.order.lock() = order.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A [`RecoveryMarker`] held in memory.
#[derive(Default, Debug)]
pub struct MemoryMarker {
    present: AtomicBool,
    failing: bool,
}

impl MemoryMarker {
    /// An absent marker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    fn write(&self, present: bool) -> Result<(), PersistenceError> {
        if self.failing {
            return Err(io::Error::other("marker storage unavailable").into());
        }
        self.present.store(present, Ordering::SeqCst);
        Ok(())
    }
}

impl RecoveryMarker for MemoryMarker {
    fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    fn set(&self) -> Result<(), PersistenceError> {
        self.write(true)
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        self.write(false)
    }
}

/// A [`Platform`] that records requests instead of acting on them.
#[derive(Debug)]
pub struct RecordingPlatform {
    repair_result: bool,
    restarts: AtomicUsize,
    repairs: Mutex<Vec<PathBuf>>,
    notifications: Mutex<Vec<(String, String)>>,
}

impl Default for RecordingPlatform {
    fn default() -> Self {
        Self {
            repair_result: true,
            restarts: AtomicUsize::new(0),
            repairs: Mutex::default(),
            notifications: Mutex::default(),
        }
    }
}

impl RecordingPlatform {
    /// A platform whose repairs succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set what [`Platform::repair`] returns.
    pub fn with_repair_result(mut self, repaired: bool) -> Self {
        self.repair_result = repaired;
        self
    }

    /// Number of restart requests.
    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    /// Paths passed to repair.
    pub fn repairs(&self) -> Vec<PathBuf> {
        self.repairs.lock().clone()
    }

    /// `(title, message)` pairs shown to the user.
    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notifications.lock().clone()
    }
}

impl Platform for RecordingPlatform {
    fn restart(&self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }

    fn repair(&self, install_path: &Path) -> bool {
        self.repairs.lock().push(install_path.to_path_buf());
        self.repair_result
    }

    fn notify(&self, title: &str, message: &str) {
        self.notifications
            .lock()
            .push((title.to_string(), message.to_string()));
    }
}

/// An [`ExceptionSink`] that keeps `(module id, rendered error)` pairs.
#[derive(Default, Debug)]
pub struct RecordingSink {
    entries: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything logged so far.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().clone()
    }
}

impl ExceptionSink for RecordingSink {
    fn log(&self, module_id: &str, error: &(dyn std::error::Error + 'static)) {
        self.entries
            .lock()
            .push((module_id.to_string(), error.to_string()));
    }
}
