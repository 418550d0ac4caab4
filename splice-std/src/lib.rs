//! # splice-std
//!
//! Runtime for the Splice interception host.
//!
//! This crate provides:
//! - **Registries**: [`HookRegistry`](hooks::HookRegistry), [`ModuleRegistry`](registry::ModuleRegistry)
//! - **Dispatch**: [`Dispatcher`](dispatch::Dispatcher) and the [`PatchLayer`](patches::PatchLayer)
//! - **Containment**: [`IsolationSupervisor`](supervisor::IsolationSupervisor),
//!   [`CrashRecoveryController`](recovery::CrashRecoveryController)
//! - **Persistence**: file-backed order store and recovery marker
//! - **Host**: [`ModHost`](host::ModHost), which owns all of the above

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core traits
pub use splice_core;

mod guard;

pub mod config;
pub mod dispatch;
pub mod hooks;
pub mod host;
pub mod patches;
pub mod persistence;
pub mod recovery;
pub mod registry;
pub mod sink;
pub mod supervisor;
pub mod testing;

#[cfg(feature = "inventory")]
pub mod catalog;

#[cfg(feature = "inventory")]
pub use inventory;
