//! Row mapping traits and utilities

use crate::error::{OrmError, OrmResult};
use crate::model::Model;
use tokio_postgres::Row;

/// Trait for converting a database row into a Rust struct.
///
/// `#[derive(Model)]` implements it by reading each mapped column by name.
///
/// # Example
///
/// ```ignore
/// use pgbind::{FromRow, OrmResult, Row, RowExt};
///
/// struct Total {
///     user_id: i64,
///     amount: f64,
/// }
///
/// impl FromRow for Total {
///     fn from_row(row: &Row) -> OrmResult<Self> {
///         Ok(Self {
///             user_id: row.try_get_column("user_id")?,
///             amount: row.try_get_column("amount")?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// Convert a database row into Self
    fn from_row(row: &Row) -> OrmResult<Self>;
}

/// Extension trait for Row to provide typed access
pub trait RowExt {
    /// Try to get a column value, returning OrmError::Decode on failure
    fn try_get_column<T>(&self, column: &str) -> OrmResult<T>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>;

    /// Decode a JSON column into `T`. SQL `NULL` decodes as JSON `null`.
    fn try_get_json<T>(&self, column: &str) -> OrmResult<T>
    where
        T: serde::de::DeserializeOwned;

    /// Read the model projected under `prop` by
    /// [`SelectQuery::add_model_column`](crate::qb::SelectQuery::add_model_column).
    fn model<M: Model>(&self, prop: &str) -> OrmResult<M>;
}

impl RowExt for Row {
    fn try_get_column<T>(&self, column: &str) -> OrmResult<T>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>,
    {
        self.try_get(column)
            .map_err(|e| OrmError::decode(column, e.to_string()))
    }

    fn try_get_json<T>(&self, column: &str) -> OrmResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let value: Option<serde_json::Value> = self.try_get_column(column)?;
        serde_json::from_value(value.unwrap_or(serde_json::Value::Null))
            .map_err(|e| OrmError::decode(column, e.to_string()))
    }

    fn model<M: Model>(&self, prop: &str) -> OrmResult<M> {
        M::from_row_prefixed(self, &format!("{prop}_"))
    }
}
