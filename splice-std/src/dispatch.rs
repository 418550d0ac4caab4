//! Interception dispatcher.
//!
//! Every intercepted call runs the same fixed protocol:
//!
//! 1. **Election** - every module hooking the method is asked whether it
//!    wants to replace the call. All are asked; the first `true` in module
//!    order wins.
//! 2. **Before** - hooking modules other than the winner observe the call.
//! 3. **Execution** - a patch claiming the call, else the winner's
//!    replacement, else the original. A failed replacement falls back to
//!    the original.
//! 4. **After** - hooking modules observe the result and may rewrite it.
//! 5. **Finalization** - modules that failed during the call are quarantined.
//!
//! The module order is captured once when the call starts. Failing modules
//! are only queued during the call and removed at finalization, so the order
//! seen by the remaining phases of that call does not shift. No lock is held
//! while module code runs, which keeps nested dispatch from inside a module
//! working.

use crate::{
    guard::contain,
    hooks::HookRegistry,
    patches::PatchLayer,
    registry::{LoadedModule, ModuleHandle, SharedRegistry},
    supervisor::IsolationSupervisor,
};
use splice_core::{
    BoxError, Capabilities, DispatchFault, ExecutionFault, HookError, InvocationContext,
    MethodKey, Phase, Value,
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// A handle for switching interception off for the rest of the process.
///
/// When off, every call goes straight to the original method.
#[derive(Debug, Clone)]
pub struct InterceptionSwitch(Arc<AtomicBool>);

impl InterceptionSwitch {
    /// Create a new switch with the given initial state.
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    /// Check if interception is on.
    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Turn interception on.
    pub fn enable(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Turn interception off.
    pub fn disable(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for InterceptionSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Modules to unload once the current call has finished.
#[derive(Debug, Default)]
pub struct PendingUnload {
    ids: Vec<String>,
}

impl PendingUnload {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a module. Returns `false` if it was already queued.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids.push(id.to_string());
        true
    }

    /// Returns `true` if the module is queued.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|queued| queued == id)
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of queued modules.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Queued identifiers in the order they failed.
    pub fn into_ids(self) -> Vec<String> {
        self.ids
    }
}

/// The per-call decision engine.
pub struct Dispatcher {
    registry: SharedRegistry,
    hooks: Arc<HookRegistry>,
    patches: Arc<PatchLayer>,
    supervisor: Arc<IsolationSupervisor>,
    switch: InterceptionSwitch,
}

impl Dispatcher {
    /// Create a dispatcher over the given registries.
    pub fn new(
        registry: SharedRegistry,
        hooks: Arc<HookRegistry>,
        patches: Arc<PatchLayer>,
        supervisor: Arc<IsolationSupervisor>,
    ) -> Self {
        Self {
            registry,
            hooks,
            patches,
            supervisor,
            switch: InterceptionSwitch::default(),
        }
    }

    /// Use an externally owned switch.
    pub fn with_switch(mut self, switch: InterceptionSwitch) -> Self {
        self.switch = switch;
        self
    }

    /// Get a handle to this dispatcher's interception switch.
    pub fn switch(&self) -> InterceptionSwitch {
        self.switch.clone()
    }

    /// Dispatch one intercepted call.
    ///
    /// `original` invokes the unmodified target method and is called at most
    /// once. Module failures never surface here; the only error is an
    /// [`ExecutionFault`] when the original itself fails.
    pub fn intercept<F>(
        &self,
        ctx: InvocationContext<'_>,
        original: F,
    ) -> Result<Value, ExecutionFault>
    where
        F: FnOnce(&InvocationContext<'_>) -> Result<Value, BoxError>,
    {
        let key = ctx.method();
        if !self.switch.is_enabled() || !self.hooks.is_hooked(key) {
            return invoke_original(&ctx, original, None);
        }

        let modules = self.registry.read().ordered_modules();
        let mut pending = PendingUnload::new();

        let replacer = self.elect(&ctx, &modules, &mut pending);
        self.notify_before(&ctx, &modules, replacer.as_ref(), &mut pending);

        let mut result = match self.execute(&ctx, replacer.as_ref(), &mut pending, original) {
            Ok(value) => value,
            Err(fault) => {
                self.finalize(pending);
                return Err(fault);
            }
        };

        self.notify_after(&ctx, &modules, &mut result, &mut pending);
        self.finalize(pending);
        Ok(result)
    }

    fn elect(
        &self,
        ctx: &InvocationContext<'_>,
        modules: &[ModuleHandle],
        pending: &mut PendingUnload,
    ) -> Option<ModuleHandle> {
        let key = ctx.method();
        let mut replacer: Option<ModuleHandle> = None;

        // Every candidate votes, even after a winner is known.
        for module in modules {
            if !module.participates(key, Capabilities::REPLACE) || !module.is_active() {
                continue;
            }
            match contain(|| module.module().wants_to_replace(ctx)) {
                Ok(true) if replacer.is_none() => replacer = Some(Arc::clone(module)),
                Ok(_) => {}
                Err(err) => self.fault(ctx, module, Phase::Election, err, pending),
            }
        }

        if let Some(winner) = &replacer {
            tracing::trace!(method = %key, module = winner.id(), "replacement elected");
        }
        replacer
    }

    fn notify_before(
        &self,
        ctx: &InvocationContext<'_>,
        modules: &[ModuleHandle],
        replacer: Option<&ModuleHandle>,
        pending: &mut PendingUnload,
    ) {
        let key = ctx.method();
        for module in modules {
            if replacer.is_some_and(|r| Arc::ptr_eq(r, module)) {
                continue;
            }
            if !self.eligible(module, key, Capabilities::BEFORE, pending) {
                continue;
            }
            if let Err(err) = contain(|| module.module().before_invoke(ctx)) {
                self.fault(ctx, module, Phase::Before, err, pending);
            }
        }
    }

    fn execute<F>(
        &self,
        ctx: &InvocationContext<'_>,
        replacer: Option<&ModuleHandle>,
        pending: &mut PendingUnload,
        original: F,
    ) -> Result<Value, ExecutionFault>
    where
        F: FnOnce(&InvocationContext<'_>) -> Result<Value, BoxError>,
    {
        if let Some(value) = self.patches.intercept(ctx) {
            return Ok(value);
        }

        let mut failed_replacer = None;
        if let Some(module) = replacer.filter(|m| m.is_active()) {
            match contain(|| module.module().replace_method(ctx)) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    failed_replacer = Some(module.id().to_string());
                    self.fault(ctx, module, Phase::Replace, err, pending);
                }
            }
        }

        invoke_original(ctx, original, failed_replacer)
    }

    fn notify_after(
        &self,
        ctx: &InvocationContext<'_>,
        modules: &[ModuleHandle],
        result: &mut Value,
        pending: &mut PendingUnload,
    ) {
        let key = ctx.method();
        for module in modules {
            if !self.eligible(module, key, Capabilities::AFTER, pending) {
                continue;
            }
            // A failing module's writes are discarded.
            let mut candidate = result.clone();
            match contain(|| module.module().after_invoke(ctx, &mut candidate)) {
                Ok(()) => *result = candidate,
                Err(err) => self.fault(ctx, module, Phase::After, err, pending),
            }
        }
    }

    fn eligible(
        &self,
        module: &LoadedModule,
        key: &MethodKey,
        cap: Capabilities,
        pending: &PendingUnload,
    ) -> bool {
        module.participates(key, cap) && module.is_active() && !pending.contains(module.id())
    }

    fn fault(
        &self,
        ctx: &InvocationContext<'_>,
        module: &LoadedModule,
        phase: Phase,
        source: HookError,
        pending: &mut PendingUnload,
    ) {
        let fault = DispatchFault {
            module: module.id().to_string(),
            method: ctx.method().clone(),
            phase,
            source,
        };
        tracing::warn!(
            module = %fault.module,
            method = %fault.method,
            phase = %fault.phase,
            error = %fault.source,
            "module failed; scheduling quarantine"
        );
        self.supervisor.record(module, &fault);
        pending.insert(module.id());
    }

    fn finalize(&self, pending: PendingUnload) {
        if !pending.is_empty() {
            self.supervisor.quarantine(pending.into_ids());
        }
    }
}

fn invoke_original<F>(
    ctx: &InvocationContext<'_>,
    original: F,
    replacer: Option<String>,
) -> Result<Value, ExecutionFault>
where
    F: FnOnce(&InvocationContext<'_>) -> Result<Value, BoxError>,
{
    contain(|| original(ctx)).map_err(|source| {
        tracing::error!(method = %ctx.method(), error = %source, "original method failed");
        ExecutionFault {
            method: ctx.method().clone(),
            replacer,
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_unload_deduplicates() {
        let mut pending = PendingUnload::new();
        assert!(pending.insert("a"));
        assert!(!pending.insert("a"));
        assert!(pending.insert("b"));
        assert_eq!(pending.len(), 2);
        assert!(pending.contains("a"));
        assert_eq!(pending.into_ids(), vec!["a", "b"]);
    }

    #[test]
    fn switch_toggles() {
        let switch = InterceptionSwitch::default();
        let observer = switch.clone();
        assert!(observer.is_enabled());
        switch.disable();
        assert!(!observer.is_enabled());
        switch.enable();
        assert!(observer.is_enabled());
    }
}
