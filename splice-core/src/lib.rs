//! # splice-core
//!
//! Core types and traits for the Splice method interception host.
//!
//! This crate has minimal dependencies and is what module authors import.
//! The registries, the dispatcher and crash recovery live in `splice-std`.
//!
//! # Vocabulary
//!
//! - [`MethodKey`] names an interceptable method; [`HookSet`] is the set a
//!   module declares; [`MethodSurface`] is everything the target provides.
//! - [`Module`] is a loaded plugin unit with [`Capabilities`].
//! - [`ModuleSource`] hands the host a constructible unit and its metadata.
//! - [`Patch`] is a host-owned claim that outranks module replacement.
//! - [`InvocationContext`] is the per-call view given to every capability.
//!
//! # Error Types
//!
//! - [`SpliceError`] - Top-level error type
//! - [`LoadError`] - Module admission errors
//! - [`DispatchFault`] / [`ExecutionFault`] / [`HostFault`] - Runtime faults

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod collaborator;
mod context;
mod error;
mod method;
mod module;
mod patch;
mod source;
mod value;

// Re-exports
pub use collaborator::{ExceptionSink, OrderStore, Platform, RecoveryMarker};
pub use context::InvocationContext;
pub use error::{
    BoxError, DispatchFault, ExecutionFault, FaultOrigin, HookError, HostFault, LoadError,
    PersistenceError, Phase, RecoveryError, SpliceError,
};
pub use method::{HookSet, MethodKey, MethodSurface, ParseMethodKeyError};
pub use module::{Capabilities, Module, ModuleOrigin};
pub use patch::{Patch, PatchOutcome};
pub use source::{ModuleSource, StaticModule, StaticSource};
pub use value::Value;
