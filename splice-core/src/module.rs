//! # Modules
//!
//! A module is a loaded plugin unit. It participates in dispatch through up
//! to four capabilities, each invoked only for methods in the module's
//! [`HookSet`](crate::HookSet):
//!
//! - **election**: [`Module::wants_to_replace`] votes on replacing the call
//! - **before**: [`Module::before_invoke`] observes the call before it runs
//! - **replace**: [`Module::replace_method`] runs instead of the original
//! - **after**: [`Module::after_invoke`] observes and may rewrite the result
//!
//! Capabilities are `&self`. Dispatch is reentrant: a module's own code may
//! call other hooked methods, which dispatch back into the same module while
//! the outer call is still in progress. Modules that keep state use interior
//! mutability.
//!
//! Returning `Err` or panicking from any capability gets the module
//! quarantined at the end of the call.

use crate::{context::InvocationContext, error::BoxError, value::Value};
use bitflags::bitflags;

bitflags! {
    /// Which dispatch phases a module takes part in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Observe calls before they run.
        const BEFORE = 1;
        /// Observe calls after they run and rewrite the result.
        const AFTER = 1 << 1;
        /// Vote in elections and replace calls.
        const REPLACE = 1 << 2;
        /// Before and after observation.
        const OBSERVE = Self::BEFORE.bits() | Self::AFTER.bits();
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::all()
    }
}

/// Where a module was installed from.
///
/// Remote modules get their failures forwarded to the exception sink so that
/// crashes can be attributed to a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Installed from local files.
    #[default]
    Local,
    /// Installed from a remote package source.
    Remote {
        /// Where the package came from.
        source: String,
    },
}

impl ModuleOrigin {
    /// Returns `true` for [`ModuleOrigin::Local`].
    pub fn is_local(&self) -> bool {
        matches!(self, ModuleOrigin::Local)
    }
}

/// A loaded plugin unit.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a Splice module",
    label = "missing `Module` implementation",
    note = "Implement `Module`; every capability has a no-op default."
)]
pub trait Module: Send + Sync + 'static {
    /// Phases this module takes part in.
    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    /// Vote on replacing the call. Should have no side effects.
    fn wants_to_replace(&self, ctx: &InvocationContext<'_>) -> Result<bool, BoxError> {
        let _ = ctx;
        Ok(false)
    }

    /// Called before the method (or its replacement) runs.
    fn before_invoke(&self, ctx: &InvocationContext<'_>) -> Result<(), BoxError> {
        let _ = ctx;
        Ok(())
    }

    /// Run in place of the original method after winning the election.
    fn replace_method(&self, ctx: &InvocationContext<'_>) -> Result<Value, BoxError> {
        Err(format!("{} elected to replace but has no replacement", ctx.method()).into())
    }

    /// Called after the call produced `result`; may overwrite it.
    fn after_invoke(&self, ctx: &InvocationContext<'_>, result: &mut Value) -> Result<(), BoxError> {
        let _ = (ctx, result);
        Ok(())
    }
}

impl<M: Module + ?Sized> Module for Box<M> {
    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn wants_to_replace(&self, ctx: &InvocationContext<'_>) -> Result<bool, BoxError> {
        (**self).wants_to_replace(ctx)
    }

    fn before_invoke(&self, ctx: &InvocationContext<'_>) -> Result<(), BoxError> {
        (**self).before_invoke(ctx)
    }

    fn replace_method(&self, ctx: &InvocationContext<'_>) -> Result<Value, BoxError> {
        (**self).replace_method(ctx)
    }

    fn after_invoke(&self, ctx: &InvocationContext<'_>, result: &mut Value) -> Result<(), BoxError> {
        (**self).after_invoke(ctx, result)
    }
}
