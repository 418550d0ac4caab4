//! Built-in patches.
//!
//! Patches are interception claims owned by the host itself. When a patch
//! handles a call its result is used, and any module that won the election
//! for that call is not invoked.

use crate::{context::InvocationContext, error::BoxError, method::HookSet, value::Value};

/// What a patch did with a call.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOutcome {
    /// The patch produced the call's result.
    Handled(Value),
    /// The patch let the call through.
    Declined,
}

/// A host-owned interception claim that outranks module replacement.
pub trait Patch: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Methods this patch intercepts.
    fn patched_methods(&self) -> HookSet;

    /// Handle a call to one of [`patched_methods`](Patch::patched_methods).
    fn intercept(&self, ctx: &InvocationContext<'_>) -> Result<PatchOutcome, BoxError>;
}
