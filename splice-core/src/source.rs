//! Module load sources.
//!
//! The registry admits a module through exactly three static queries (name,
//! version, hooks) plus one constructor call. Discovering the unit inside a
//! package is the source's business, not the core's.

use crate::{
    error::BoxError,
    method::{HookSet, MethodSurface},
    module::{Module, ModuleOrigin},
};
use std::marker::PhantomData;

/// A resolved, constructible module unit.
pub trait ModuleSource: Send + Sync {
    /// Human-readable module name.
    fn name(&self) -> String;

    /// Module version.
    fn version(&self) -> u32;

    /// Methods the module wants to hook, given what the target provides.
    fn hooks(&self, surface: &MethodSurface, host_version: u32) -> Result<HookSet, BoxError>;

    /// Build the module instance. Called exactly once per load.
    fn construct(&self) -> Result<Box<dyn Module>, BoxError>;

    /// Where the module was installed from.
    fn origin(&self) -> ModuleOrigin {
        ModuleOrigin::Local
    }
}

impl<S: ModuleSource + ?Sized> ModuleSource for &S {
    fn name(&self) -> String {
        (**self).name()
    }

    fn version(&self) -> u32 {
        (**self).version()
    }

    fn hooks(&self, surface: &MethodSurface, host_version: u32) -> Result<HookSet, BoxError> {
        (**self).hooks(surface, host_version)
    }

    fn construct(&self) -> Result<Box<dyn Module>, BoxError> {
        (**self).construct()
    }

    fn origin(&self) -> ModuleOrigin {
        (**self).origin()
    }
}

/// A module type whose metadata is known at compile time.
///
/// Usually derived with `#[derive(StaticModule)]`, then loaded through
/// [`StaticSource`].
pub trait StaticModule: Module + Sized {
    /// Module name.
    const NAME: &'static str;

    /// Module version.
    const VERSION: u32;

    /// Methods the module wants to hook.
    fn hooks(surface: &MethodSurface, host_version: u32) -> Result<HookSet, BoxError>;

    /// Build the module instance.
    fn construct() -> Result<Self, BoxError>;
}

/// Adapts a [`StaticModule`] type into a [`ModuleSource`].
pub struct StaticSource<M> {
    origin: ModuleOrigin,
    _marker: PhantomData<fn() -> M>,
}

impl<M> StaticSource<M> {
    /// A local source for `M`.
    pub const fn new() -> Self {
        Self {
            origin: ModuleOrigin::Local,
            _marker: PhantomData,
        }
    }

    /// Set the origin reported for `M`.
    pub fn with_origin(mut self, origin: ModuleOrigin) -> Self {
        self.origin = origin;
        self
    }
}

impl<M> Default for StaticSource<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: StaticModule> ModuleSource for StaticSource<M> {
    fn name(&self) -> String {
        M::NAME.to_string()
    }

    fn version(&self) -> u32 {
        M::VERSION
    }

    fn hooks(&self, surface: &MethodSurface, host_version: u32) -> Result<HookSet, BoxError> {
        M::hooks(surface, host_version)
    }

    fn construct(&self) -> Result<Box<dyn Module>, BoxError> {
        Ok(Box::new(M::construct()?))
    }

    fn origin(&self) -> ModuleOrigin {
        self.origin.clone()
    }
}
