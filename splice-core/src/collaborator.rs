//! Interfaces to the world outside the dispatch core.

use crate::error::PersistenceError;
use std::path::Path;

/// Persists the module order.
///
/// The whole order is rewritten on every change.
pub trait OrderStore: Send + Sync {
    /// Read the stored order. A store that was never written reads as empty.
    fn load(&self) -> Result<Vec<String>, PersistenceError>;

    /// Replace the stored order.
    fn save(&self, order: &[String]) -> Result<(), PersistenceError>;
}

/// Process-level operations used by crash recovery.
pub trait Platform: Send + Sync {
    /// Restart the host process.
    fn restart(&self);

    /// Restore and repatch the target install. `false` means the install is
    /// unusable and the host has to terminate.
    fn repair(&self, install_path: &Path) -> bool;

    /// Tell the user something went wrong.
    fn notify(&self, title: &str, message: &str);
}

/// Receives failures attributed to a module.
pub trait ExceptionSink: Send + Sync {
    /// Record `error` against `module_id`.
    fn log(&self, module_id: &str, error: &(dyn std::error::Error + 'static));
}

/// Survives a restart to detect repeated host crashes.
pub trait RecoveryMarker: Send + Sync {
    /// Returns `true` if a previous run left the marker behind.
    fn is_present(&self) -> bool;

    /// Leave the marker for the next run.
    fn set(&self) -> Result<(), PersistenceError>;

    /// Remove the marker.
    fn clear(&self) -> Result<(), PersistenceError>;
}
