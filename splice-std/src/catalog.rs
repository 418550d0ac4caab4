//! Link-time module catalog.
//!
//! Statically linked modules are submitted to `inventory` with
//! [`submit_module!`](crate::submit_module) and discovered at boot with
//! [`registered_modules`], so a host binary needs no hand-maintained list.

use crate::host::InstalledModule;
use splice_core::ModuleSource;
use std::sync::Arc;

/// Registration entry for a statically linked module.
///
/// This struct is submitted to `inventory` for automatic collection.
pub struct ModuleRegistration {
    /// Stable module identifier.
    pub id: &'static str,
    /// The source the host loads from.
    pub source: &'static dyn ModuleSource,
}

inventory::collect!(ModuleRegistration);

/// Every module submitted to the catalog, enabled, sorted by id.
///
/// Link order is unspecified, so the catalog is sorted to keep first-boot
/// ordering deterministic. Persisted order takes over after that.
pub fn registered_modules() -> Vec<InstalledModule> {
    let mut modules: Vec<_> = inventory::iter::<ModuleRegistration>()
        .map(|reg| {
            let source: Arc<dyn ModuleSource> = Arc::new(reg.source);
            InstalledModule::new(reg.id, source)
        })
        .collect();
    modules.sort_by(|a, b| a.id.cmp(&b.id));
    modules
}

/// Number of modules in the catalog.
pub fn registered_count() -> usize {
    inventory::iter::<ModuleRegistration>().count()
}

/// Submit a [`StaticModule`](splice_core::StaticModule) type to the catalog.
///
/// ```rust,ignore
/// splice_std::submit_module!("fast-draw", FastDraw);
/// ```
#[macro_export]
macro_rules! submit_module {
    ($id:expr, $module:ty) => {
        const _: () = {
            static SOURCE: $crate::splice_core::StaticSource<$module> =
                $crate::splice_core::StaticSource::new();

            $crate::inventory::submit! {
                $crate::catalog::ModuleRegistration {
                    id: $id,
                    source: &SOURCE,
                }
            }
        };
    };
}
