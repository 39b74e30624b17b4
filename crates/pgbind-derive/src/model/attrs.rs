//! Attribute parsing for Model derive macro.
//!
//! Handles struct-level and field-level `#[orm(...)]` attributes.

use heck::ToSnakeCase;
use syn::{DeriveInput, LitInt, LitStr, Result};

/// Table name from `#[orm(table = "...")]`, defaulting to the snake_case
/// struct name.
pub(super) fn table_name(input: &DeriveInput) -> Result<String> {
    let mut table = None;

    for attr in &input.attrs {
        if !attr.path().is_ident("orm") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                table = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported struct attribute, expected `table`"))
            }
        })?;
    }

    Ok(table.unwrap_or_else(|| input.ident.to_string().to_snake_case()))
}

/// Parsed `#[orm(...)]` options on one field.
#[derive(Default)]
pub(super) struct FieldAttr {
    pub key: Option<u32>,
    pub auto_increment: bool,
    pub column: Option<String>,
    pub nullable: bool,
    pub json: bool,
    pub skip: bool,
}

impl FieldAttr {
    pub(super) fn parse(field: &syn::Field) -> Result<Self> {
        let mut out = FieldAttr::default();

        for attr in &field.attrs {
            if !attr.path().is_ident("orm") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("key") {
                    out.key = Some(if meta.input.peek(syn::Token![=]) {
                        let order: LitInt = meta.value()?.parse()?;
                        order.base10_parse()?
                    } else {
                        0
                    });
                } else if meta.path.is_ident("auto_increment") {
                    out.auto_increment = true;
                } else if meta.path.is_ident("column") {
                    let value: LitStr = meta.value()?.parse()?;
                    out.column = Some(value.value());
                } else if meta.path.is_ident("nullable") {
                    out.nullable = true;
                } else if meta.path.is_ident("json") {
                    out.json = true;
                } else if meta.path.is_ident("skip") {
                    out.skip = true;
                } else {
                    return Err(meta.error(
                        "unsupported field attribute, expected one of \
                         `key`, `auto_increment`, `column`, `nullable`, `json`, `skip`",
                    ));
                }
                Ok(())
            })?;
        }

        if out.auto_increment && out.key.is_none() {
            return Err(syn::Error::new_spanned(
                field,
                "`auto_increment` is only valid on a `key` field",
            ));
        }

        Ok(out)
    }
}

/// Whether `ty` is written as `Option<...>`.
pub(super) fn is_option(ty: &syn::Type) -> bool {
    let syn::Type::Path(path) = ty else {
        return false;
    };
    path.qself.is_none()
        && path
            .path
            .segments
            .last()
            .is_some_and(|seg| seg.ident == "Option")
}
