//! Failure containment for third-party code.

use splice_core::{BoxError, HookError};
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Run module or patch code, turning both `Err` returns and panics into a
/// [`HookError`].
///
/// The closure only borrows state owned by the failing module or by the
/// current call, neither of which is touched again after a failure, so
/// asserting unwind safety holds.
pub(crate) fn contain<T>(f: impl FnOnce() -> Result<T, BoxError>) -> Result<T, HookError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(HookError::Custom(err)),
        Err(payload) => Err(HookError::from_panic(payload)),
    }
}
