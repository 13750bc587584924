use darling::{FromDeriveInput, FromField};
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Ident};

#[derive(FromField)]
struct IdField {
    ident: Option<Ident>,
}

#[derive(FromDeriveInput)]
#[darling(supports(struct_named))]
struct IdStruct {
    ident: Ident,
    data: darling::ast::Data<(), IdField>,
}

/// Implements `crate::models::traits::Id` for a struct with an `id: String` field.
#[proc_macro_derive(Id)]
pub fn id_derive(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    let parsed_struct = match IdStruct::from_derive_input(&ast) {
        Ok(value) => value,
        Err(e) => return e.write_errors().into(),
    };
    let struct_name = parsed_struct.ident;

    let id_field = match parsed_struct.data {
        darling::ast::Data::Struct(fields) => fields
            .fields
            .into_iter()
            .filter_map(|field| field.ident)
            .find(|ident| ident == "id"),
        _ => None,
    };

    match id_field {
        Some(field_name) => {
            let expanded = quote! {
                impl crate::models::traits::Id for #struct_name {
                    fn id(&self) -> &str {
                        &self.#field_name
                    }
                }
            };

            TokenStream::from(expanded)
        }
        None => syn::Error::new_spanned(&ast.ident, "Id requires a field named `id`")
            .to_compile_error()
            .into(),
    }
}
