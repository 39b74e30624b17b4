//! Model derive macro implementation

mod attrs;

use attrs::{FieldAttr, is_option, table_name};
use proc_macro2::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Fields, Result};

struct MappedField {
    ident: syn::Ident,
    prop: String,
    column: String,
    attr: FieldAttr,
    nullable: bool,
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let table = table_name(&input)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Model can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Model can only be derived for structs",
            ));
        }
    };

    let mut mapped = Vec::new();
    let mut skipped = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let attr = FieldAttr::parse(field)?;
        if attr.skip {
            skipped.push(ident);
            continue;
        }
        let prop = ident.unraw().to_string();
        let column = attr.column.clone().unwrap_or_else(|| prop.clone());
        let nullable = attr.nullable || is_option(&field.ty);
        mapped.push(MappedField {
            ident,
            prop,
            column,
            attr,
            nullable,
        });
    }

    let mut auto_increment = None;
    for field in mapped.iter().filter(|f| f.attr.auto_increment) {
        if auto_increment.is_some() {
            return Err(syn::Error::new_spanned(
                &field.ident,
                "only one field may be `auto_increment`",
            ));
        }
        auto_increment = Some(field);
    }

    let keys = ordered_keys(&mapped);

    let column_metas = mapped.iter().map(|f| {
        let prop = &f.prop;
        let column = &f.column;
        let key = match f.attr.key {
            Some(order) => quote!(::core::option::Option::Some(#order)),
            None => quote!(::core::option::Option::None),
        };
        let auto = f.attr.auto_increment;
        let nullable = f.nullable;
        let json = f.attr.json;
        quote! {
            ::pgbind::ColumnMeta {
                prop: #prop,
                column: #column,
                key: #key,
                auto_increment: #auto,
                nullable: #nullable,
                json: #json,
            }
        }
    });

    let auto_meta = match auto_increment {
        Some(f) => {
            let prop = &f.prop;
            quote!(::core::option::Option::Some(#prop))
        }
        None => quote!(::core::option::Option::None),
    };

    let field_values = mapped.iter().map(|f| {
        let ident = &f.ident;
        let prop = &f.prop;
        if f.attr.json {
            quote!((#prop, ::pgbind::Value::json(&self.#ident)?))
        } else {
            quote!((#prop, ::pgbind::Value::from(::core::clone::Clone::clone(&self.#ident))))
        }
    });

    let field_reads = mapped.iter().map(|f| {
        let ident = &f.ident;
        let column = &f.column;
        let read = if f.attr.json {
            quote!(try_get_json)
        } else {
            quote!(try_get_column)
        };
        quote! {
            #ident: ::pgbind::RowExt::#read(row, &::std::format!("{}{}", prefix, #column))?
        }
    });

    let skipped_defaults = skipped.iter().map(|ident| {
        quote!(#ident: ::core::default::Default::default())
    });

    let assign_key = match auto_increment {
        Some(f) => {
            let ident = &f.ident;
            let column = &f.column;
            quote! {
                self.#ident = ::pgbind::RowExt::try_get_column(row, #column)?;
                ::core::result::Result::Ok(())
            }
        }
        None => quote! {
            let _ = row;
            ::core::result::Result::Ok(())
        },
    };

    Ok(quote! {
        impl #impl_generics ::pgbind::FromRow for #name #ty_generics #where_clause {
            fn from_row(row: &::pgbind::Row) -> ::pgbind::OrmResult<Self> {
                <Self as ::pgbind::Model>::from_row_prefixed(row, "")
            }
        }

        impl #impl_generics ::pgbind::Model for #name #ty_generics #where_clause {
            fn table_meta() -> &'static ::pgbind::TableMeta {
                static COLUMNS: &[::pgbind::ColumnMeta] = &[#(#column_metas),*];
                static META: ::pgbind::TableMeta = ::pgbind::TableMeta {
                    name: #table,
                    columns: COLUMNS,
                    keys: &[#(#keys),*],
                    auto_increment: #auto_meta,
                };
                &META
            }

            fn field_values(
                &self,
            ) -> ::pgbind::OrmResult<::std::vec::Vec<(&'static str, ::pgbind::Value)>> {
                ::core::result::Result::Ok(::std::vec![#(#field_values),*])
            }

            fn from_row_prefixed(
                row: &::pgbind::Row,
                prefix: &str,
            ) -> ::pgbind::OrmResult<Self> {
                ::core::result::Result::Ok(Self {
                    #(#field_reads,)*
                    #(#skipped_defaults,)*
                })
            }

            fn assign_generated_key(&mut self, row: &::pgbind::Row) -> ::pgbind::OrmResult<()> {
                #assign_key
            }
        }
    })
}

/// Key props sorted by key order. Equal orders keep declaration order, each
/// later one moving to the next free slot.
fn ordered_keys(fields: &[MappedField]) -> Vec<String> {
    let mut slots: Vec<(u32, &str)> = Vec::new();
    for field in fields {
        let Some(mut order) = field.attr.key else {
            continue;
        };
        while slots.iter().any(|(taken, _)| *taken == order) {
            order += 1;
        }
        slots.push((order, field.prop.as_str()));
    }
    slots.sort_by_key(|(order, _)| *order);
    slots.into_iter().map(|(_, prop)| prop.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn mapped(input: DeriveInput) -> Vec<MappedField> {
        let Data::Struct(data) = input.data else {
            unreachable!()
        };
        data.fields
            .iter()
            .map(|f| {
                let attr = FieldAttr::parse(f).unwrap();
                let ident = f.ident.clone().unwrap();
                MappedField {
                    prop: ident.unraw().to_string(),
                    column: ident.unraw().to_string(),
                    ident,
                    nullable: attr.nullable,
                    attr,
                }
            })
            .collect()
    }

    #[test]
    fn keys_follow_order_then_declaration() {
        let input: DeriveInput = parse_quote! {
            struct Membership {
                #[orm(key = 1)]
                group_id: i64,
                #[orm(key)]
                user_id: i64,
                #[orm(key = 1)]
                role: String,
                note: String,
            }
        };
        assert_eq!(ordered_keys(&mapped(input)), ["user_id", "group_id", "role"]);
    }

    #[test]
    fn table_defaults_to_snake_case() {
        let input: DeriveInput = parse_quote! {
            struct OrderLine { id: i64 }
        };
        assert_eq!(table_name(&input).unwrap(), "order_line");

        let input: DeriveInput = parse_quote! {
            #[orm(table = "lines")]
            struct OrderLine { id: i64 }
        };
        assert_eq!(table_name(&input).unwrap(), "lines");
    }

    #[test]
    fn auto_increment_requires_key() {
        let input: DeriveInput = parse_quote! {
            struct Bad {
                #[orm(auto_increment)]
                id: i64,
            }
        };
        assert!(expand(input).is_err());
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let input: DeriveInput = parse_quote! {
            struct Bad {
                #[orm(primary)]
                id: i64,
            }
        };
        assert!(expand(input).is_err());
    }

    #[test]
    fn option_fields_are_nullable() {
        assert!(is_option(&parse_quote!(Option<String>)));
        assert!(is_option(&parse_quote!(std::option::Option<i32>)));
        assert!(!is_option(&parse_quote!(String)));
    }

    #[test]
    fn raw_identifiers_drop_their_prefix() {
        let input: DeriveInput = parse_quote! {
            struct Thing {
                #[orm(key)]
                id: i64,
                r#type: String,
            }
        };
        let tokens = expand(input).unwrap().to_string();
        assert!(tokens.contains("prop : \"type\""));
        assert!(tokens.contains("column : \"type\""));
        assert!(!tokens.contains("r#type\""));
    }

    #[test]
    fn skipped_fields_use_default() {
        let input: DeriveInput = parse_quote! {
            struct User {
                #[orm(key)]
                id: i64,
                #[orm(skip)]
                score: f64,
            }
        };
        let tokens = expand(input).unwrap().to_string();
        assert!(tokens.contains("Default :: default ()"));
        assert!(!tokens.contains("prop : \"score\""));
    }
}
