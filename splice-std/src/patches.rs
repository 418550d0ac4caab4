//! Patch layer.

use crate::{guard::contain, hooks::HookRegistry};
use parking_lot::RwLock;
use splice_core::{HookSet, InvocationContext, MethodKey, Patch, PatchOutcome, Value};
use std::sync::Arc;

struct InstalledPatch {
    methods: HookSet,
    patch: Arc<dyn Patch>,
}

/// Host-owned patches, consulted before module replacement.
///
/// Patches are asked in installation order; the first one that handles a
/// call supplies its result. A failing patch is logged and treated as
/// having declined.
pub struct PatchLayer {
    patches: RwLock<Vec<Arc<InstalledPatch>>>,
    hooks: Arc<HookRegistry>,
}

impl PatchLayer {
    /// An empty layer registering its hooks in `hooks`.
    pub fn new(hooks: Arc<HookRegistry>) -> Self {
        Self {
            patches: RwLock::new(Vec::new()),
            hooks,
        }
    }

    /// Install a patch and mark its methods as intercepted.
    pub fn install<P: Patch + 'static>(&self, patch: P) {
        self.install_arc(Arc::new(patch));
    }

    /// Install a shared patch.
    pub fn install_arc(&self, patch: Arc<dyn Patch>) {
        let methods = patch.patched_methods();
        self.hooks.register_all(&methods);
        tracing::debug!(patch = patch.name(), methods = methods.len(), "patch installed");
        self.patches
            .write()
            .push(Arc::new(InstalledPatch { methods, patch }));
    }

    /// Union of every installed patch's methods.
    pub fn patched_methods(&self) -> HookSet {
        self.patches
            .read()
            .iter()
            .flat_map(|p| p.methods.iter().cloned())
            .collect()
    }

    /// Returns `true` if some patch intercepts `key`.
    pub fn claims(&self, key: &MethodKey) -> bool {
        self.patches.read().iter().any(|p| p.methods.contains(key))
    }

    /// Offer the call to the patches claiming it.
    ///
    /// Returns the result of the first patch that handled it.
    pub fn intercept(&self, ctx: &InvocationContext<'_>) -> Option<Value> {
        let key = ctx.method();
        let claiming: Vec<Arc<InstalledPatch>> = self
            .patches
            .read()
            .iter()
            .filter(|p| p.methods.contains(key))
            .cloned()
            .collect();

        for installed in claiming {
            match contain(|| installed.patch.intercept(ctx)) {
                Ok(PatchOutcome::Handled(value)) => return Some(value),
                Ok(PatchOutcome::Declined) => {}
                Err(err) => {
                    tracing::warn!(
                        patch = installed.patch.name(),
                        method = %key,
                        error = %err,
                        "patch failed; treating as declined"
                    );
                }
            }
        }
        None
    }

    /// Number of installed patches.
    pub fn len(&self) -> usize {
        self.patches.read().len()
    }

    /// Returns `true` if no patch is installed.
    pub fn is_empty(&self) -> bool {
        self.patches.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticPatch;

    fn key() -> MethodKey {
        MethodKey::new("Menu", "open")
    }

    #[test]
    fn install_registers_hooks() {
        let hooks = Arc::new(HookRegistry::new());
        let layer = PatchLayer::new(hooks.clone());
        layer.install(StaticPatch::handling(&["Menu::open"], Value::Int(1)));

        assert!(hooks.is_hooked(&key()));
        assert!(layer.claims(&key()));
        assert!(layer.patched_methods().contains(&key()));
    }

    #[test]
    fn first_handling_patch_wins() {
        let layer = PatchLayer::new(Arc::new(HookRegistry::new()));
        let declining = StaticPatch::declining(&["Menu::open"]);
        let failing = StaticPatch::failing(&["Menu::open"]);
        layer.install(declining.clone());
        layer.install(failing.clone());
        layer.install(StaticPatch::handling(&["Menu::open"], Value::Int(2)));
        layer.install(StaticPatch::handling(&["Menu::open"], Value::Int(3)));

        let key = key();
        let ctx = InvocationContext::new(&key, &[]);
        assert_eq!(layer.intercept(&ctx), Some(Value::Int(2)));
        assert_eq!(declining.calls(), 1);
        assert_eq!(failing.calls(), 1);
    }

    #[test]
    fn unclaimed_calls_are_not_offered() {
        let layer = PatchLayer::new(Arc::new(HookRegistry::new()));
        let patch = StaticPatch::handling(&["Menu::close"], Value::Unit);
        layer.install(patch.clone());

        let key = key();
        assert_eq!(layer.intercept(&InvocationContext::new(&key, &[])), None);
        assert_eq!(patch.calls(), 0);
    }
}
