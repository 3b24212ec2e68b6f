//! Derive macros for `FieldSeal`.
//!
//! `#[derive(FieldContract)]` declares the serialized field names of a struct
//! so field selections can be checked against the type before encryption.

#![warn(clippy::pedantic, clippy::nursery)]

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

/// Derives `fieldseal::FieldContract` for a struct with named fields.
///
/// Field names follow serde: `#[serde(rename = "...")]` on a field and
/// `#[serde(rename_all = "camelCase")]` (or `snake_case`) on the struct are
/// honored. Fields marked `#[serde(skip)]` are left out.
///
/// # Example
///
/// ```rust,ignore
/// use fieldseal_derive::FieldContract;
///
/// #[derive(Serialize, Deserialize, FieldContract)]
/// #[serde(rename_all = "camelCase")]
/// struct BankAccount {
///     pk: String,
///     account_number: String,
///     balance: u64,
/// }
///
/// assert_eq!(BankAccount::FIELDS, &["pk", "accountNumber", "balance"]);
/// ```
#[proc_macro_derive(FieldContract, attributes(serde))]
pub fn derive_field_contract(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input).unwrap_or_else(syn::Error::into_compile_error).into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "FieldContract can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "FieldContract requires named fields",
        ));
    };

    let container = SerdeAttrs::parse(&input.attrs)?;
    let mut names = Vec::new();
    for field in &fields.named {
        let attrs = SerdeAttrs::parse(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        let name = match (attrs.rename, field.ident.as_ref()) {
            (Some(rename), _) => rename,
            (None, Some(ident)) => {
                let ident = ident.to_string();
                let ident = ident.strip_prefix("r#").unwrap_or(&ident);
                apply_rename_all(ident, container.rename_all.as_deref())
            }
            (None, None) => continue,
        };
        names.push(name);
    }

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    Ok(quote! {
        impl #impl_generics ::fieldseal::FieldContract for #ident #ty_generics #where_clause {
            const FIELDS: &'static [&'static str] = &[#(#names),*];
        }
    })
}

#[derive(Default)]
struct SerdeAttrs {
    rename: Option<String>,
    rename_all: Option<String>,
    skip: bool,
}

impl SerdeAttrs {
    fn parse(attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut parsed = Self::default();
        for attr in attrs.iter().filter(|attr| attr.path().is_ident("serde")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    parsed.rename = Some(meta.value()?.parse::<LitStr>()?.value());
                } else if meta.path.is_ident("rename_all") {
                    parsed.rename_all = Some(meta.value()?.parse::<LitStr>()?.value());
                } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                    parsed.skip = true;
                } else if meta.input.peek(syn::Token![=]) {
                    // Other serde options do not affect field names.
                    meta.value()?.parse::<syn::Expr>()?;
                } else if meta.input.peek(syn::token::Paren) {
                    meta.parse_nested_meta(|nested| {
                        if nested.input.peek(syn::Token![=]) {
                            nested.value()?.parse::<syn::Expr>()?;
                        }
                        Ok(())
                    })?;
                }
                Ok(())
            })?;
        }
        Ok(parsed)
    }
}

fn apply_rename_all(ident: &str, rule: Option<&str>) -> String {
    match rule {
        Some("camelCase") => {
            let mut out = String::with_capacity(ident.len());
            let mut upper = false;
            for ch in ident.chars() {
                if ch == '_' {
                    upper = !out.is_empty();
                } else if upper {
                    out.extend(ch.to_uppercase());
                    upper = false;
                } else {
                    out.push(ch);
                }
            }
            out
        }
        Some("PascalCase") => {
            let camel = apply_rename_all(ident, Some("camelCase"));
            let mut chars = camel.chars();
            chars.next().map_or_else(String::new, |first| first.to_uppercase().chain(chars).collect())
        }
        Some("lowercase") => ident.to_lowercase(),
        Some("UPPERCASE" | "SCREAMING_SNAKE_CASE") => ident.to_uppercase(),
        Some("kebab-case") => ident.replace('_', "-"),
        _ => ident.to_string(),
    }
}
