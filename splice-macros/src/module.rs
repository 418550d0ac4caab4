//! `#[derive(StaticModule)]`.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{DeriveInput, LitInt, LitStr, Token, parse::Parse, parse_macro_input, punctuated::Punctuated};

/// Parsed `#[module(...)]` arguments.
#[derive(Default)]
struct ModuleArgs {
    name: Option<LitStr>,
    version: Option<u32>,
    hooks: Vec<(String, String)>,
}

impl ModuleArgs {
    fn from_input(input: &DeriveInput) -> syn::Result<Self> {
        let mut args = ModuleArgs::default();
        for attr in input.attrs.iter().filter(|a| a.path().is_ident("module")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    args.name = Some(meta.value()?.parse()?);
                    Ok(())
                } else if meta.path.is_ident("version") {
                    let lit: LitInt = meta.value()?.parse()?;
                    args.version = Some(lit.base10_parse()?);
                    Ok(())
                } else if meta.path.is_ident("hooks") {
                    let content;
                    syn::parenthesized!(content in meta.input);
                    let lits: Punctuated<LitStr, Token![,]> =
                        content.parse_terminated(<LitStr as Parse>::parse, Token![,])?;
                    for lit in lits {
                        args.hooks.push(split_hook(&lit)?);
                    }
                    Ok(())
                } else {
                    Err(meta.error("unknown module attribute"))
                }
            })?;
        }
        Ok(args)
    }
}

fn split_hook(lit: &LitStr) -> syn::Result<(String, String)> {
    let value = lit.value();
    match value.rsplit_once("::") {
        Some((ty, method)) if !ty.is_empty() && !method.is_empty() => {
            Ok((ty.to_string(), method.to_string()))
        }
        _ => Err(syn::Error::new(
            lit.span(),
            format!("expected `Type::method`, got `{value}`"),
        )),
    }
}

/// Implementation of `#[derive(StaticModule)]`.
pub fn derive_static_module_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let args = match ModuleArgs::from_input(&input) {
        Ok(args) => args,
        Err(err) => return err.to_compile_error().into(),
    };

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let name = args
        .name
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), Span::call_site()));
    let version = args.version.unwrap_or(1);
    let hooks = args.hooks.iter().map(|(ty, method)| {
        quote! { ::splice::MethodKey::new(#ty, #method) }
    });

    let expanded = quote! {
        impl #impl_generics ::splice::StaticModule for #ident #ty_generics #where_clause {
            const NAME: &'static str = #name;
            const VERSION: u32 = #version;

            fn hooks(
                _surface: &::splice::MethodSurface,
                _host_version: u32,
            ) -> ::core::result::Result<::splice::HookSet, ::splice::BoxError> {
                ::core::result::Result::Ok(
                    ::std::vec![#(#hooks),*].into_iter().collect(),
                )
            }

            fn construct() -> ::core::result::Result<Self, ::splice::BoxError> {
                ::core::result::Result::Ok(<Self as ::core::default::Default>::default())
            }
        }
    };

    TokenStream::from(expanded)
}
