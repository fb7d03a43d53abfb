//! Procedural macros for cibus.
//!
//! - `#[derive(Label)]`: implements `cibus::Label` for an enum, returning the
//!   variant name as the label.
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

#[proc_macro_derive(Label)]
pub fn derive_label(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let ident = input.ident;
    let generics = input.generics;

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let body = match &input.data {
        Data::Enum(data_enum) => {
            let arms = data_enum.variants.iter().map(|variant| {
                let variant_ident = &variant.ident;
                let variant_name = variant_ident.to_string();
                let pattern = variant_pattern(variant_ident, &variant.fields);
                quote! {
                    #pattern => ::std::borrow::Cow::Borrowed(#variant_name)
                }
            });
            quote! {
                match self {
                    #(#arms),*
                }
            }
        }
        _ => {
            let name = ident.to_string();
            quote! { ::std::borrow::Cow::Borrowed(#name) }
        }
    };

    let expanded = quote! {
        impl #impl_generics cibus::Label for #ident #ty_generics #where_clause {
            fn label(&self) -> ::std::borrow::Cow<'static, str> {
                #body
            }
        }
    };
    TokenStream::from(expanded)
}

fn variant_pattern(variant_ident: &syn::Ident, fields: &Fields) -> TokenStream2 {
    match fields {
        Fields::Unit => quote! { Self::#variant_ident },
        Fields::Unnamed(_) => quote! { Self::#variant_ident(..) },
        Fields::Named(_) => quote! { Self::#variant_ident { .. } },
    }
}
