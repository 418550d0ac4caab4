//! Error types for Splice.
//!
//! The hierarchy follows where a failure is allowed to travel:
//!
//! - [`LoadError`] - a module could not be admitted; local to that module
//! - [`DispatchFault`] - one module capability failed during a call; contained
//! - [`ExecutionFault`] - a call produced no result; surfaced to the caller
//! - [`HostFault`] - a failure outside dispatch containment; fed to crash recovery
//! - [`PersistenceError`] / [`RecoveryError`] - collaborator failures
//! - [`SpliceError`] - top-level aggregate

use crate::method::MethodKey;
use std::{any::Any, fmt, path::PathBuf};
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all Splice operations.
#[derive(Error, Debug)]
pub enum SpliceError {
    /// A module failed to load.
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// An intercepted call could not produce a result.
    #[error("execution fault: {0}")]
    Execution(#[from] ExecutionFault),

    /// A host-wide fault.
    #[error("host fault: {0}")]
    Host(#[from] HostFault),

    /// Reading or writing persisted state failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Crash recovery could not complete.
    #[error("recovery error: {0}")]
    Recovery(#[from] RecoveryError),
}

/// Failure raised by module or patch code.
#[derive(Error, Debug)]
pub enum HookError {
    /// The code panicked.
    #[error("panicked: {0}")]
    Panic(String),

    /// The code returned an error.
    #[error(transparent)]
    Custom(BoxError),
}

impl HookError {
    /// Build a [`HookError::Panic`] from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        HookError::Panic(message)
    }

    /// Returns `true` if this error came from a panic.
    pub fn is_panic(&self) -> bool {
        matches!(self, HookError::Panic(_))
    }
}

impl From<BoxError> for HookError {
    fn from(err: BoxError) -> Self {
        HookError::Custom(err)
    }
}

/// Errors that prevent a module from being admitted.
///
/// A failed load leaves no trace in any registry.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The module constructor failed.
    #[error("module `{id}` failed to construct")]
    ConstructionFailed {
        /// Module identifier.
        id: String,
        /// Constructor failure.
        #[source]
        source: HookError,
    },

    /// The hook query failed or named methods the target does not have.
    #[error("module `{id}` declared invalid hooks: {reason}")]
    InvalidHooks {
        /// Module identifier.
        id: String,
        /// What was wrong with the hooks.
        reason: String,
    },

    /// A module with the same identifier is already loaded.
    #[error("module `{0}` is already loaded")]
    AlreadyLoaded(String),

    /// The identifier cannot be stored in the module order.
    #[error("invalid module identifier {0:?}")]
    InvalidId(String),
}

impl LoadError {
    /// Identifier of the module that failed to load.
    pub fn module_id(&self) -> &str {
        match self {
            LoadError::ConstructionFailed { id, .. } | LoadError::InvalidHooks { id, .. } => id,
            LoadError::AlreadyLoaded(id) | LoadError::InvalidId(id) => id,
        }
    }
}

/// The dispatch phase a module capability was invoked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Replacement election.
    Election,
    /// Before-call notification.
    Before,
    /// Replacement execution.
    Replace,
    /// After-call notification.
    After,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Election => "election",
            Phase::Before => "before",
            Phase::Replace => "replace",
            Phase::After => "after",
        };
        f.write_str(name)
    }
}

/// A single module capability failed during dispatch.
///
/// Never escapes the dispatcher: it is logged and the module is quarantined.
#[derive(Error, Debug)]
#[error("module `{module}` failed during {phase} of {method}")]
pub struct DispatchFault {
    /// Module identifier.
    pub module: String,
    /// Method being dispatched.
    pub method: MethodKey,
    /// Phase that failed.
    pub phase: Phase,
    /// Underlying failure.
    #[source]
    pub source: HookError,
}

/// The execution phase of a call could not produce any result.
#[derive(Error, Debug)]
#[error("no result could be produced for {method}")]
pub struct ExecutionFault {
    /// Method being dispatched.
    pub method: MethodKey,
    /// Replacer that failed before the original was tried, if any.
    pub replacer: Option<String>,
    /// Failure of the original method.
    #[source]
    pub source: HookError,
}

/// Where a host-wide fault originated.
///
/// Classification is done by whichever layer captured the call origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FaultOrigin {
    /// Host or target code; no single module is responsible.
    Host,
    /// Code belonging to the module with this identifier.
    Module(String),
}

/// An uncaught failure anywhere in the host process.
#[derive(Error, Debug)]
#[error("uncaught fault ({origin:?})")]
pub struct HostFault {
    /// Classified origin.
    pub origin: FaultOrigin,
    /// The failure.
    #[source]
    pub source: BoxError,
}

impl HostFault {
    /// Fault raised by host code.
    pub fn host(source: impl Into<BoxError>) -> Self {
        Self {
            origin: FaultOrigin::Host,
            source: source.into(),
        }
    }

    /// Fault attributed to a module.
    pub fn module(id: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            origin: FaultOrigin::Module(id.into()),
            source: source.into(),
        }
    }
}

impl From<ExecutionFault> for HostFault {
    fn from(fault: ExecutionFault) -> Self {
        HostFault::host(fault)
    }
}

/// Errors from persisted state (module order, recovery marker).
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Underlying I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored line could not be parsed.
    #[error("malformed entry on line {line}: {content:?}")]
    Malformed {
        /// One-based line number.
        line: usize,
        /// Offending content.
        content: String,
    },

    /// An identifier that would not survive a save and reload.
    #[error("identifier {0:?} cannot be stored")]
    InvalidId(String),
}

/// Errors that end crash recovery.
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// The target install could not be repaired; the host must terminate.
    #[error("repair of {0} failed")]
    RepairFailed(PathBuf),

    /// The recovery marker could not be read or written.
    #[error("recovery marker: {0}")]
    Marker(#[from] PersistenceError),
}
