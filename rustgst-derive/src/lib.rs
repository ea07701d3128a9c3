//! Derive macro for the `NativeObject` trait of `rustgst`.
//!
//! ```ignore
//! use rustgst::prelude::*;
//!
//! #[derive(NativeObject)]
//! struct Pipeline {
//!     core: ObjectCore,
//! }
//!
//! #[derive(NativeObject)]
//! struct Pad {
//!     #[native(core)]
//!     inner: ObjectCore,
//!     direction: i32,
//! }
//! ```
//!
//! Inside `rustgst` itself, use `#[native(crate_path = "crate")]`.
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Member};

/// Derive macro generating an impl of the trait `NativeObject`.
///
/// The embedded `ObjectCore` is the field marked `#[native(core)]`, or the field named `core`.
#[proc_macro_derive(NativeObject, attributes(native))]
pub fn native_object_derive(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    impl_native_object(&ast).unwrap_or_else(|err| err.to_compile_error().into())
}

fn impl_native_object(ast: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();
    let crate_path = crate_path(ast)?;

    let fields = match &ast.data {
        Data::Struct(ds) => &ds.fields,
        _ => {
            return Err(syn::Error::new_spanned(
                ast,
                "NativeObject can only be derived for structs",
            ))
        }
    };
    let core = core_field(fields).ok_or_else(|| {
        syn::Error::new_spanned(
            ast,
            "NativeObject needs a field named `core` or marked `#[native(core)]`",
        )
    })?;

    let gen = quote! {
        impl #impl_generics #crate_path::object::NativeObject for #name #ty_generics #where_clause {
            #[inline]
            fn core(&self) -> &#crate_path::object::ObjectCore {
                &self.#core
            }
        }
    };
    Ok(gen.into())
}

fn crate_path(ast: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let mut crate_path = None;
    for attr in ast.attrs.iter().filter(|a| a.path().is_ident("native")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate_path") {
                let value: syn::LitStr = meta.value()?.parse()?;
                let path: syn::Path = value.parse()?;
                crate_path = Some(quote! { #path });
                Ok(())
            } else {
                Err(meta.error("unsupported attribute, expected `crate_path`"))
            }
        })?;
    }
    Ok(crate_path.unwrap_or_else(|| quote! { ::rustgst }))
}

fn core_field(fields: &Fields) -> Option<Member> {
    let marked = fields.iter().enumerate().find(|(_, field)| {
        field.attrs.iter().any(|attr| {
            attr.path().is_ident("native")
                && attr
                    .parse_args::<syn::Ident>()
                    .is_ok_and(|ident| ident == "core")
        })
    });
    if let Some((index, field)) = marked {
        return Some(match &field.ident {
            Some(ident) => Member::Named(ident.clone()),
            None => Member::Unnamed(index.into()),
        });
    }

    fields
        .iter()
        .filter_map(|field| field.ident.as_ref())
        .find(|ident| *ident == "core")
        .map(|ident| Member::Named(ident.clone()))
}
