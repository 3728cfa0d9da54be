//! `#[derive(FromContext)]`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

use crate::fields::named_fields;

pub fn derive_from_context_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let component = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let root = match root_type(&input) {
        Ok(root) => root,
        Err(err) => return err.to_compile_error().into(),
    };

    let fields = match named_fields(&input, "FromContext") {
        Ok(fields) => fields,
        Err(err) => return err.to_compile_error().into(),
    };

    let inits = fields.iter().filter_map(|field| {
        let ident = field.ident.as_ref()?;
        let ty = &field.ty;
        Some(quote! {
            #ident: <#ty as crate::FromRef<#root>>::from_ref(ctx)
        })
    });

    TokenStream::from(quote! {
        impl #impl_generics crate::FromRef<#root> for #component #ty_generics #where_clause {
            fn from_ref(ctx: &#root) -> Self {
                Self {
                    #(#inits),*
                }
            }
        }
    })
}

/// Reads `#[from_context(Context = "Type")]`, defaulting to `Context`.
fn root_type(input: &DeriveInput) -> Result<proc_macro2::TokenStream, syn::Error> {
    let mut root: Option<syn::Type> = None;

    for attr in input
        .attrs
        .iter()
        .filter(|a| a.path().is_ident("from_context"))
    {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("Context") {
                let value: syn::LitStr = meta.value()?.parse()?;
                root = Some(value.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `Context = \"Type\"`"))
            }
        })?;
    }

    Ok(match root {
        Some(ty) => quote! { #ty },
        None => quote! { Context },
    })
}
