//! # splice - Crash-Contained Method Interception
//!
//! `splice` hosts plugin modules that intercept methods of a running
//! target. Each intercepted call goes through a fixed protocol: modules vote
//! on replacing the call, observe it before and after, and may rewrite the
//! result. A module that fails at any step is unloaded at the end of that
//! call and the target keeps running.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use splice::prelude::*;
//!
//! let host = ModHost::builder(HostConfig::new("/opt/game"), surface, platform).build();
//! host.boot(&installed)?;
//!
//! let key = MethodKey::new("Deck", "draw");
//! let result = host.intercept(InvocationContext::new(&key, &args), |ctx| draw(ctx))?;
//! ```

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

pub use splice_core::{
    // Errors
    BoxError, DispatchFault, ExecutionFault, FaultOrigin, HookError, HostFault, LoadError,
    ParseMethodKeyError, PersistenceError, RecoveryError, SpliceError,
    // Methods
    HookSet, MethodKey, MethodSurface,
    // Invocation
    InvocationContext, Phase, Value,
    // Modules
    Capabilities, Module, ModuleOrigin, ModuleSource, StaticModule, StaticSource,
    // Patches
    Patch, PatchOutcome,
    // Collaborators
    ExceptionSink, OrderStore, Platform, RecoveryMarker,
};

pub use splice_std::{
    config::HostConfig,
    dispatch::{Dispatcher, InterceptionSwitch, PendingUnload},
    hooks::HookRegistry,
    host::{BootReport, InstalledModule, ModHost, ModHostBuilder},
    patches::PatchLayer,
    persistence::{FileMarker, FileOrderStore},
    recovery::{CrashRecoveryController, RecoveryAction, RecoveryState},
    registry::{ActiveHandle, LoadedModule, ModuleHandle, ModuleRegistry, SharedRegistry},
    sink::TracingSink,
    supervisor::IsolationSupervisor,
};

/// Order file helpers.
pub mod persistence {
    pub use splice_std::persistence::{
        FileMarker, FileOrderStore, is_storable_id, parse_order, reconcile, render_order,
    };
}

/// Testing utilities.
pub mod testing {
    #![allow(clippy::wildcard_imports)]
    pub use splice_std::testing::*;
}

/// Link-time module catalog.
#[cfg(feature = "inventory")]
pub mod catalog {
    pub use splice_std::catalog::{ModuleRegistration, registered_count, registered_modules};
}

/// Prelude module - common imports for Splice.
///
/// # Usage
///
/// ```rust,ignore
/// use splice::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        BoxError, Capabilities, HostConfig, HostFault, InstalledModule, InvocationContext,
        MethodKey, MethodSurface, ModHost, Module, ModuleSource, Patch, PatchOutcome, Platform,
        StaticModule, StaticSource, Value,
    };
}

#[cfg(feature = "macros")]
pub use splice_macros::StaticModule;

#[cfg(feature = "inventory")]
pub use splice_std::submit_module;

#[cfg(feature = "inventory")]
pub use inventory;
