//! Derive macros for pgbind
//!
//! Provides `#[derive(Model)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod model;

/// Derive `Model` (and `FromRow`) for a struct.
///
/// # Example
///
/// ```ignore
/// use pgbind::Model;
///
/// #[derive(Model)]
/// #[orm(table = "users")]
/// struct User {
///     #[orm(key, auto_increment)]
///     id: i64,
///     #[orm(column = "first_name")]
///     name: String,
///     #[orm(json)]
///     settings: serde_json::Value,
///     #[orm(skip)]
///     cached_score: Option<f64>,
/// }
/// ```
///
/// # Attributes
///
/// - `#[orm(table = "name")]` - Table name (default: snake_case struct name)
/// - `#[orm(key)]` / `#[orm(key = N)]` - Part of the primary key, in order `N`
/// - `#[orm(auto_increment)]` - Key generated by the database
/// - `#[orm(column = "name")]` - Map field to a different column name
/// - `#[orm(nullable)]` - Column accepts NULL (implied for `Option<T>`)
/// - `#[orm(json)]` - Stored as JSON, (de)serialized with serde
/// - `#[orm(skip)]` - Not mapped; filled with `Default` on load
///
/// Mapped fields must convert with `pgbind::Value::from`. `u64` and `usize`
/// only have a checked `TryFrom`; store them as `i64` or mark them `json`.
/// Raw identifiers map without their prefix: `r#type` is prop `type`.
#[proc_macro_derive(Model, attributes(orm))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    model::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
