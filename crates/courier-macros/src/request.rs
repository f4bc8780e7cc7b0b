//! `#[derive(Request)]` implementation.
//!
//! # Struct-level attributes `#[request(...)]`
//!
//! | Key | Example | Required | Description |
//! |-----|---------|----------|-------------|
//! | `result` | `"OrderId"` | **Yes**, repeatable | Result type; one `Request<T>` impl per entry |
//! | `crate` | `"::courier::core"` | No | Path to the core crate (default `::courier_core`) |

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, LitStr, Path, Type, spanned::Spanned};

/// Everything collected from the `#[request(...)]` attributes.
struct RequestAttrs {
    results: Vec<Type>,
    krate: Option<Path>,
}

pub fn derive_request(input: &DeriveInput) -> syn::Result<TokenStream> {
    if let Data::Union(_) = &input.data {
        return Err(syn::Error::new(
            input.span(),
            "Request cannot be derived for unions",
        ));
    }

    let attrs = parse_attrs(&input.attrs)?;
    if attrs.results.is_empty() {
        return Err(syn::Error::new(
            input.ident.span(),
            "#[derive(Request)] requires at least one `#[request(result = \"Type\")]`",
        ));
    }

    let name = &input.ident;
    let krate = attrs
        .krate
        .map(|path| quote! { #path })
        .unwrap_or_else(|| quote! { ::courier_core });
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let impls = attrs.results.iter().map(|result| {
        quote! {
            impl #impl_generics #krate::Request<#result> for #name #ty_generics #where_clause {}
        }
    });

    Ok(quote! { #(#impls)* })
}

fn parse_attrs(attrs: &[Attribute]) -> syn::Result<RequestAttrs> {
    let mut parsed = RequestAttrs {
        results: Vec::new(),
        krate: None,
    };
    let mut seen = Vec::new();

    for attr in attrs.iter().filter(|a| a.path().is_ident("request")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("result") {
                let lit: LitStr = meta.value()?.parse()?;
                let ty: Type = lit.parse()?;
                let rendered = quote!(#ty).to_string();
                if seen.contains(&rendered) {
                    return Err(meta.error(format!("duplicate request result `{rendered}`")));
                }
                seen.push(rendered);
                parsed.results.push(ty);
                Ok(())
            } else if meta.path.is_ident("crate") {
                let lit: LitStr = meta.value()?.parse()?;
                parsed.krate = Some(lit.parse()?);
                Ok(())
            } else {
                Err(meta.error("unknown request attribute, expected `result` or `crate`"))
            }
        })?;
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use syn::parse_quote;

    use super::*;

    fn expand(input: DeriveInput) -> syn::Result<String> {
        derive_request(&input).map(|tokens| tokens.to_string())
    }

    #[test]
    fn test_one_impl_per_result() {
        let out = expand(parse_quote! {
            #[request(result = "OrderId")]
            #[request(result = "Box<i32>")]
            struct CreateOrder { sku: String }
        })
        .unwrap();

        assert!(out.contains("impl :: courier_core :: Request < OrderId > for CreateOrder"));
        assert!(out.contains("Request < Box < i32 > > for CreateOrder"));
    }

    #[test]
    fn test_generics_and_crate_path() {
        let out = expand(parse_quote! {
            #[request(result = "()", crate = "courier::core")]
            struct Wrapped<T: Clone> where T: Send { inner: T }
        })
        .unwrap();

        assert!(out.contains("impl < T : Clone > courier :: core :: Request < () > for Wrapped < T >"));
        assert!(out.contains("where T : Send"));
    }

    #[test]
    fn test_missing_result_rejected() {
        let err = expand(parse_quote! { struct Ping; }).unwrap_err();
        assert!(err.to_string().contains("requires at least one"));
    }

    #[test]
    fn test_duplicate_and_unknown_keys_rejected() {
        assert!(expand(parse_quote! {
            #[request(result = "u32", result = "u32")]
            struct Ping;
        })
        .is_err());
        assert!(expand(parse_quote! {
            #[request(reply = "u32")]
            struct Ping;
        })
        .is_err());
    }

    #[test]
    fn test_union_rejected() {
        let err = expand(parse_quote! {
            #[request(result = "u32")]
            union Bits { a: u32, b: f32 }
        })
        .unwrap_err();
        assert!(err.to_string().contains("unions"));
    }
}
