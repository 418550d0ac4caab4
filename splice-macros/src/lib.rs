//! Procedural macros for Splice.
//!
//! - `#[derive(StaticModule)]` - implements `StaticModule` from a `#[module(...)]` attribute

use proc_macro::TokenStream;

mod module;

/// Derive `StaticModule` for a module type.
///
/// The type must implement `Module` and `Default`.
///
/// ```rust,ignore
/// #[derive(Default, StaticModule)]
/// #[module(name = "fast-draw", version = 2, hooks("Deck::draw", "Deck::shuffle"))]
/// struct FastDraw;
/// ```
///
/// `name` defaults to the type name and `version` to `1`. Hook strings are
/// checked at compile time.
#[proc_macro_derive(StaticModule, attributes(module))]
pub fn derive_static_module(input: TokenStream) -> TokenStream {
    module::derive_static_module_impl(input)
}
