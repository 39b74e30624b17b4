//! Table-mapped structs.
//!
//! A [`Model`] describes its table through a static [`TableMeta`], produced at
//! compile time by `#[derive(Model)]`:
//!
//! ```ignore
//! use pgbind::Model;
//!
//! #[derive(Debug, Clone, Model)]
//! #[orm(table = "users")]
//! struct User {
//!     #[orm(key, auto_increment)]
//!     id: i64,
//!     #[orm(column = "first_name")]
//!     name: String,
//!     email: Option<String>,
//! }
//!
//! let mut user = pgbind::Record::new(User { id: 0, name: "Ada".into(), email: None });
//! db.save(&mut user).await?;          // INSERT ... RETURNING "id"
//! let found = db.find::<User>("name = :name:", &params! { "name" => "Ada" }).await?;
//! ```
//!
//! Models fetched from the database are wrapped in a [`Record`], which tracks
//! whether the row exists. `save` and `delete` flip that flag and register an
//! `Aborted` callback that flips it back if the surrounding transaction rolls
//! back.

use crate::adapter::Adapter;
use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use crate::qb::{LockMode, SelectQuery};
use crate::row::{FromRow, RowExt};
use crate::template::is_placeholder_char;
use crate::transaction::TrackType;
use crate::value::{Params, Value, quote_ident};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_postgres::Row;

/// One mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Rust field name.
    pub prop: &'static str,
    /// Database column name.
    pub column: &'static str,
    /// Key order when the field is part of the primary key.
    pub key: Option<u32>,
    pub auto_increment: bool,
    pub nullable: bool,
    /// Stored as JSON text.
    pub json: bool,
}

/// Table mapping for a [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableMeta {
    pub name: &'static str,
    /// Mapped fields in declaration order.
    pub columns: &'static [ColumnMeta],
    /// Key props in key order.
    pub keys: &'static [&'static str],
    /// Prop of the auto-increment key, if any.
    pub auto_increment: Option<&'static str>,
}

impl TableMeta {
    pub fn column(&self, prop: &str) -> Option<&'static ColumnMeta> {
        self.columns.iter().find(|c| c.prop == prop)
    }

    /// Key columns in key order.
    pub fn key_columns(&self) -> impl Iterator<Item = &'static ColumnMeta> + '_ {
        self.keys.iter().filter_map(|prop| self.column(prop))
    }

    /// Rewrite prop names in a filter to their column names.
    ///
    /// Quoted spans, `:placeholder:` names and the type name after a `::`
    /// cast are left alone.
    pub fn map_props(&self, filter: &str) -> String {
        let bytes = filter.as_bytes();
        let mut out = String::with_capacity(filter.len());
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            let start = i;

            if b == b'\'' || b == b'"' {
                i += 1;
                while i < bytes.len() && bytes[i] != b {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
                out.push_str(&filter[start..i]);
            } else if b == b':' && bytes.get(i + 1) == Some(&b':') {
                i += 2;
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                out.push_str(&filter[start..i]);
            } else if b == b':' {
                i += 1;
                while i < bytes.len() && is_placeholder_char(bytes[i]) {
                    i += 1;
                }
                if i < bytes.len() && bytes[i] == b':' && i > start + 1 {
                    i += 1;
                } else {
                    i = start + 1;
                }
                out.push_str(&filter[start..i]);
            } else if is_word_byte(b) {
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                let word = &filter[start..i];
                match self.column(word) {
                    Some(meta) => out.push_str(meta.column),
                    None => out.push_str(word),
                }
            } else {
                let len = filter[i..].chars().next().map_or(1, char::len_utf8);
                i += len;
                out.push_str(&filter[start..i]);
            }
        }

        out
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// A struct mapped onto a table. Use `#[derive(Model)]`.
pub trait Model: FromRow + Send + 'static {
    fn table_meta() -> &'static TableMeta;

    /// Database values of every mapped field, keyed by prop, in column order.
    fn field_values(&self) -> OrmResult<Vec<(&'static str, Value)>>;

    /// Build the model from columns named `<prefix><column>`.
    fn from_row_prefixed(row: &Row, prefix: &str) -> OrmResult<Self>;

    /// Store the auto-increment key returned by an INSERT.
    fn assign_generated_key(&mut self, row: &Row) -> OrmResult<()>;

    /// Key values in key order.
    fn key_values(&self) -> OrmResult<Vec<Value>> {
        let meta = Self::table_meta();
        let mut values = self.field_values()?;
        let mut keys = Vec::with_capacity(meta.keys.len());
        for key in meta.keys {
            let pos = values
                .iter()
                .position(|(prop, _)| prop == key)
                .ok_or_else(|| OrmError::Other(format!("key field {key} has no value")))?;
            keys.push(values.swap_remove(pos).1);
        }
        Ok(keys)
    }
}

/// A model plus whether it is mirrored by a row in the database.
pub struct Record<M> {
    model: M,
    exists: Arc<AtomicBool>,
}

impl<M> Record<M> {
    /// A model not yet inserted.
    pub fn new(model: M) -> Self {
        Self::with_flag(model, false)
    }

    /// A model loaded from the database.
    pub fn existing(model: M) -> Self {
        Self::with_flag(model, true)
    }

    fn with_flag(model: M, exists: bool) -> Self {
        Self {
            model,
            exists: Arc::new(AtomicBool::new(exists)),
        }
    }

    pub fn exists(&self) -> bool {
        self.exists.load(Ordering::SeqCst)
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn into_inner(self) -> M {
        self.model
    }

    pub(crate) fn exists_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.exists)
    }

    fn set_exists(&self, exists: bool) {
        self.exists.store(exists, Ordering::SeqCst);
    }
}

impl<M> Deref for Record<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.model
    }
}

impl<M> DerefMut for Record<M> {
    fn deref_mut(&mut self) -> &mut M {
        &mut self.model
    }
}

/// Cloning detaches the existence flag: the copy starts with the current
/// value but no longer follows the original.
impl<M: Clone> Clone for Record<M> {
    fn clone(&self) -> Self {
        Self::with_flag(self.model.clone(), self.exists())
    }
}

impl<M: std::fmt::Debug> std::fmt::Debug for Record<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("model", &self.model)
            .field("exists", &self.exists())
            .finish()
    }
}

/// A SELECT over `M`'s table that yields `M` through
/// [`SelectQuery::fetch_models`].
pub fn model_query<M: Model>(alias: &str) -> SelectQuery {
    SelectQuery::for_model::<M>(alias)
}

fn key_filter(meta: &TableMeta) -> OrmResult<String> {
    if meta.keys.is_empty() {
        return Err(OrmError::invalid_operation(format!(
            "table {} has no key columns",
            meta.name
        )));
    }
    Ok(meta
        .key_columns()
        .map(|c| format!("{} = :{}:", quote_ident(c.column), c.prop))
        .collect::<Vec<_>>()
        .join(" AND "))
}

fn is_positive(value: &Value) -> bool {
    match value {
        Value::Int(i) => *i > 0,
        Value::Float(f) => *f > 0.0,
        _ => false,
    }
}

impl<C: GenericClient> Adapter<C> {
    async fn select_models<M: Model>(
        &mut self,
        condition: &str,
        params: &Params,
        lock: Option<LockMode>,
        single: bool,
    ) -> OrmResult<Vec<Record<M>>> {
        let meta = M::table_meta();
        let condition = condition.trim();
        let condition = if condition.is_empty() { "1=1" } else { condition };

        let mut sql = format!("SELECT * FROM {} WHERE {condition}", quote_ident(meta.name));
        if single {
            sql.push_str(" LIMIT 1");
        }
        if let Some(mode) = lock {
            sql.push(' ');
            sql.push_str(mode.as_sql());
        }

        let rows = self.query(&sql, params).await?;
        rows.iter()
            .map(|row| M::from_row(row).map(Record::existing))
            .collect()
    }

    /// Every row of `M` matching `filter` (all rows when empty).
    ///
    /// The filter may name fields by prop; they are rewritten to columns.
    pub async fn find<M: Model>(
        &mut self,
        filter: &str,
        params: &Params,
    ) -> OrmResult<Vec<Record<M>>> {
        let filter = M::table_meta().map_props(filter);
        self.select_models(&filter, params, None, false).await
    }

    /// [`find`](Self::find) with `FOR SHARE` / `FOR UPDATE` row locks.
    pub async fn find_locked<M: Model>(
        &mut self,
        mode: LockMode,
        filter: &str,
        params: &Params,
    ) -> OrmResult<Vec<Record<M>>> {
        if !self.in_transaction() {
            return Err(OrmError::invalid_operation(
                "Row locking is only valid within a transaction",
            ));
        }
        let filter = M::table_meta().map_props(filter);
        self.select_models(&filter, params, Some(mode), false).await
    }

    /// The first row of `M` matching `filter`.
    pub async fn find_one<M: Model>(
        &mut self,
        filter: &str,
        params: &Params,
    ) -> OrmResult<Option<Record<M>>> {
        let filter = M::table_meta().map_props(filter);
        Ok(self
            .select_models(&filter, params, None, true)
            .await?
            .into_iter()
            .next())
    }

    /// The row whose keys equal `keys`, given in key order.
    pub async fn get_by_key<M: Model>(&mut self, keys: &[Value]) -> OrmResult<Option<Record<M>>> {
        let meta = M::table_meta();
        if keys.len() != meta.keys.len() {
            return Err(OrmError::invalid_parameter(format!(
                "{} expects {} key value(s), got {}",
                meta.name,
                meta.keys.len(),
                keys.len()
            )));
        }

        let filter = key_filter(meta)?;
        let params: Params = meta
            .keys
            .iter()
            .zip(keys)
            .map(|(prop, value)| (prop.to_string(), value.clone()))
            .collect();

        Ok(self
            .select_models(&filter, &params, None, true)
            .await?
            .into_iter()
            .next())
    }

    /// Number of rows of `M` matching `filter`.
    pub async fn count<M: Model>(&mut self, filter: &str, params: &Params) -> OrmResult<i64> {
        let meta = M::table_meta();
        let filter = meta.map_props(filter.trim());
        let mut sql = format!(
            "SELECT COUNT(*) AS row_count FROM {} WHERE 1=1",
            quote_ident(meta.name)
        );
        if !filter.is_empty() {
            sql.push_str(&format!(" AND ({filter})"));
        }

        let row = self.query_one(&sql, params).await?;
        row.try_get_column("row_count")
    }

    /// UPDATE an existing record, INSERT a new one.
    ///
    /// On insert a non-positive auto-increment key is left to the database and
    /// read back through `RETURNING`. Returns whether a row was written.
    pub async fn save<M: Model>(&mut self, record: &mut Record<M>) -> OrmResult<bool> {
        if record.exists() {
            self.update_record(record).await
        } else {
            self.insert_record(record).await
        }
    }

    async fn update_record<M: Model>(&mut self, record: &mut Record<M>) -> OrmResult<bool> {
        let meta = M::table_meta();
        let filter = key_filter(meta)?;
        let values = record.field_values()?;

        let assignments: Vec<String> = meta
            .columns
            .iter()
            .filter(|c| c.key.is_none())
            .map(|c| format!("{} = :{}:", quote_ident(c.column), c.prop))
            .collect();
        if assignments.is_empty() {
            return Ok(false);
        }

        let params: Params = values
            .into_iter()
            .map(|(prop, value)| (prop.to_string(), value))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {filter}",
            quote_ident(meta.name),
            assignments.join(", ")
        );

        Ok(self.execute(&sql, &params).await? > 0)
    }

    async fn insert_record<M: Model>(&mut self, record: &mut Record<M>) -> OrmResult<bool> {
        let meta = M::table_meta();
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();
        let mut params = Params::new();
        let mut generated = None;

        for (prop, value) in record.field_values()? {
            let Some(column) = meta.column(prop) else {
                continue;
            };
            if column.key.is_some() && column.auto_increment && !is_positive(&value) {
                generated = Some(column);
                continue;
            }
            columns.push(quote_ident(column.column));
            placeholders.push(format!(":{prop}:"));
            params.insert(prop.to_string(), value);
        }

        let mut sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(meta.name))
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(meta.name),
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        match generated {
            Some(column) => {
                sql.push_str(&format!(" RETURNING {}", quote_ident(column.column)));
                let rows = self.query(&sql, &params).await?;
                if let Some(row) = rows.first() {
                    record.assign_generated_key(row)?;
                }
            }
            None => {
                self.execute(&sql, &params).await?;
            }
        }

        record.set_exists(true);
        let flag = record.exists_flag();
        self.track_model(TrackType::Aborted, move || {
            flag.store(false, Ordering::SeqCst);
        });
        Ok(true)
    }

    /// DELETE the record's row. Returns whether a row was removed.
    pub async fn delete<M: Model>(&mut self, record: &mut Record<M>) -> OrmResult<bool> {
        if !record.exists() {
            return Ok(false);
        }

        let meta = M::table_meta();
        let filter = key_filter(meta)?;
        let keys = record.key_values()?;
        let params: Params = meta
            .keys
            .iter()
            .zip(keys)
            .map(|(prop, value)| (prop.to_string(), value))
            .collect();

        let sql = format!("DELETE FROM {} WHERE {filter}", quote_ident(meta.name));
        if self.execute(&sql, &params).await? == 0 {
            return Ok(false);
        }

        record.set_exists(false);
        let flag = record.exists_flag();
        self.track_model(TrackType::Aborted, move || {
            flag.store(true, Ordering::SeqCst);
        });
        Ok(true)
    }
}
