use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, parse_macro_input};

/// Derives `formstate::form::FormModel` for a struct with named `String` or
/// `bool` fields.
///
/// Field names default to the Rust field names. `#[form(rename_all = "camelCase")]`
/// on the struct or `#[form(rename = "...")]` on a field change them.
#[proc_macro_derive(FormModel, attributes(form))]
pub fn derive_form_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(error) => error.to_compile_error().into(),
    }
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.ident,
            "FormModel derive currently supports only non-generic structs",
        ));
    }

    let container = parse_form_attrs(&input.attrs)?;
    if container.rename.is_some() {
        return Err(syn::Error::new(
            Span::call_site(),
            "`rename` applies to fields; use `rename_all` on the struct",
        ));
    }

    let model_ident = input.ident;
    let fields_struct_ident = format_ident!("{model_ident}Fields");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return Err(syn::Error::new(
                    Span::call_site(),
                    "FormModel derive requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                Span::call_site(),
                "FormModel derive is only supported on structs",
            ));
        }
    };

    let formstate = formstate_path();
    let form = quote!(#formstate::form);
    let mut lens_defs = Vec::new();
    let mut fields_methods = Vec::new();
    let mut keys = Vec::new();
    let mut value_arms = Vec::new();
    let mut set_arms = Vec::new();

    for field in named_fields {
        let Some(field_ident) = field.ident else {
            continue;
        };
        let attrs = parse_form_attrs(&field.attrs)?;
        if attrs.rename_all.is_some() {
            return Err(syn::Error::new_spanned(
                &field_ident,
                "`rename_all` applies to the struct; use `rename` on fields",
            ));
        }
        let field_ty = field.ty;
        let rust_name = field_ident.to_string();
        let field_name = match (attrs.rename, container.rename_all) {
            (Some(rename), _) => rename,
            (None, Some(RenameAll::CamelCase)) => to_camel_case(&rust_name),
            (None, None) => rust_name.clone(),
        };
        let lens_ident = format_ident!("{model_ident}{}Lens", to_pascal_case(&rust_name));

        lens_defs.push(quote! {
            #[derive(Clone, Copy, Debug, Default)]
            pub struct #lens_ident;

            impl #form::FieldLens<#model_ident> for #lens_ident {
                type Value = #field_ty;

                fn key(self) -> #form::FieldKey {
                    #form::FieldKey::new(#field_name)
                }

                fn get<'a>(self, model: &'a #model_ident) -> &'a Self::Value {
                    &model.#field_ident
                }

                fn set(self, model: &mut #model_ident, value: Self::Value) {
                    model.#field_ident = value;
                }
            }
        });

        fields_methods.push(quote! {
            pub const fn #field_ident(&self) -> #lens_ident {
                #lens_ident
            }
        });

        keys.push(quote!(#form::FieldKey::new(#field_name)));

        value_arms.push(quote! {
            #field_name => ::core::option::Option::Some(
                <#field_ty as #form::FieldType>::into_value(::core::clone::Clone::clone(&self.#field_ident)),
            ),
        });

        set_arms.push(quote! {
            #field_name => {
                let found = value.kind();
                match <#field_ty as #form::FieldType>::from_value(value) {
                    ::core::option::Option::Some(value) => {
                        self.#field_ident = value;
                        ::core::result::Result::Ok(())
                    }
                    ::core::option::Option::None => {
                        ::core::result::Result::Err(#form::FormError::TypeMismatch {
                            field: #form::FieldKey::new(#field_name),
                            expected: <#field_ty as #form::FieldType>::KIND,
                            found,
                        })
                    }
                }
            }
        });
    }

    Ok(quote! {
        #[derive(Clone, Copy, Debug, Default)]
        pub struct #fields_struct_ident;

        impl #fields_struct_ident {
            #(#fields_methods)*
        }

        impl #form::FormModel for #model_ident {
            type Fields = #fields_struct_ident;

            fn fields() -> Self::Fields {
                #fields_struct_ident
            }

            fn field_keys(&self) -> ::std::vec::Vec<#form::FieldKey> {
                ::std::vec![#(#keys),*]
            }

            fn value(&self, name: &str) -> ::core::option::Option<#form::FieldValue> {
                match name {
                    #(#value_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            fn set_value(
                &mut self,
                name: &str,
                value: #form::FieldValue,
            ) -> #form::FormResult<()> {
                match name {
                    #(#set_arms)*
                    _ => ::core::result::Result::Err(#form::FormError::UnknownField(
                        #form::FieldKey::owned(name),
                    )),
                }
            }
        }

        #(#lens_defs)*
    })
}

#[derive(Clone, Copy)]
enum RenameAll {
    CamelCase,
}

#[derive(Default)]
struct FormAttrs {
    rename: Option<String>,
    rename_all: Option<RenameAll>,
}

fn parse_form_attrs(attrs: &[Attribute]) -> syn::Result<FormAttrs> {
    let mut parsed = FormAttrs::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("form")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                parsed.rename = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("rename_all") {
                let value: LitStr = meta.value()?.parse()?;
                match value.value().as_str() {
                    "camelCase" => {
                        parsed.rename_all = Some(RenameAll::CamelCase);
                        Ok(())
                    }
                    _ => Err(meta.error("unsupported rename_all style, expected \"camelCase\"")),
                }
            } else {
                Err(meta.error("unsupported form attribute"))
            }
        })?;
    }
    Ok(parsed)
}

fn formstate_path() -> TokenStream2 {
    match crate_name("formstate") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::formstate),
    }
}

fn to_pascal_case(input: &str) -> String {
    let mut out = String::new();
    for segment in input.split('_') {
        if segment.is_empty() {
            continue;
        }
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

fn to_camel_case(input: &str) -> String {
    let pascal = to_pascal_case(input);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
