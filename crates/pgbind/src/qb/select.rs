//! SELECT query builder.

use crate::adapter::Adapter;
use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use crate::model::{Model, Record, TableMeta};
use crate::qb::expr::QueryExpr;
use crate::row::{FromRow, RowExt};
use crate::template::populate;
use crate::value::{Params, Value, quote_ident};
use tokio_postgres::Row;

/// Column name prefix marking "the row is one model" in
/// [`SelectQuery::fetch_models`].
pub const SINGLE_RESULT: &str = "__s-r_";

/// Row locking appended to the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Other transactions may read but not write the rows (`FOR SHARE`).
    AllowReads,
    /// `FOR UPDATE`.
    Exclusive,
}

impl LockMode {
    pub fn as_sql(self) -> &'static str {
        match self {
            LockMode::AllowReads => "FOR SHARE",
            LockMode::Exclusive => "FOR UPDATE",
        }
    }
}

/// Target of a FROM or JOIN clause.
#[derive(Debug, Clone)]
pub enum Source {
    /// Table name, inserted as written.
    Table(String),
    /// Subquery, compiled when the outer query compiles.
    Query(Box<SelectQuery>),
    /// Parameterized subquery text.
    Expr(QueryExpr),
}

impl Source {
    /// The table mapped by `M`.
    pub fn model<M: Model>() -> Self {
        Source::Table(quote_ident(M::table_meta().name))
    }

    fn render(&self, params: &mut Params) -> OrmResult<String> {
        match self {
            Source::Table(name) => Ok(name.clone()),
            Source::Query(query) => {
                let (sql, sub) = QueryExpr::from_builder(query)?.into_parts();
                params.extend(sub);
                Ok(format!("({sql})"))
            }
            Source::Expr(expr) => {
                params.extend(expr.params().clone());
                Ok(format!("({})", expr.sql()))
            }
        }
    }
}

impl From<&str> for Source {
    fn from(name: &str) -> Self {
        Source::Table(name.to_string())
    }
}

impl From<String> for Source {
    fn from(name: String) -> Self {
        Source::Table(name)
    }
}

impl From<SelectQuery> for Source {
    fn from(query: SelectQuery) -> Self {
        Source::Query(Box::new(query))
    }
}

impl From<QueryExpr> for Source {
    fn from(expr: QueryExpr) -> Self {
        Source::Expr(expr)
    }
}

/// One entry of the projection list.
#[derive(Debug, Clone)]
pub enum Column {
    /// `<sql> AS "<name>"`.
    Expr(String),
    /// Every mapped column of a model, read from `alias`, each aliased
    /// `"<name>_<column>"`.
    Model {
        table: &'static TableMeta,
        alias: String,
    },
    /// `"<alias>".*`.
    All(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Left,
    Right,
    Inner,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Inner => "INNER JOIN",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    pub target: Source,
    pub on: String,
}

/// Incrementally built SELECT statement.
///
/// Every method that takes a [`QueryExpr`] merges the fragment's parameters
/// into the query's running parameter set; [`compile`](Self::compile) returns
/// the template together with that set.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    from: Option<(Source, String)>,
    joins: Vec<(String, Join)>,
    columns: Vec<(String, Column)>,
    where_clause: String,
    having_clause: String,
    group_by: Vec<String>,
    order_by: Vec<String>,
    /// (limit, offset)
    limit: Option<(u64, u64)>,
    lock: Option<LockMode>,
    params: Params,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// A query over `M`'s table that projects the model as the single result.
    pub fn for_model<M: Model>(alias: &str) -> Self {
        Self::new()
            .from_model::<M>(alias)
            .add_model_column::<M>(SINGLE_RESULT, alias)
    }

    // ==================== FROM / JOIN ====================

    pub fn from(mut self, source: impl Into<Source>, alias: &str) -> Self {
        self.from = Some((source.into(), alias.to_string()));
        self
    }

    pub fn from_model<M: Model>(self, alias: &str) -> Self {
        self.from(Source::model::<M>(), alias)
    }

    fn join(
        mut self,
        kind: JoinKind,
        target: impl Into<Source>,
        alias: &str,
        on: impl Into<QueryExpr>,
    ) -> Self {
        let on = self.absorb(on.into());
        let join = Join {
            kind,
            target: target.into(),
            on,
        };
        match self.joins.iter_mut().find(|(a, _)| a == alias) {
            Some((_, existing)) => *existing = join,
            None => self.joins.push((alias.to_string(), join)),
        }
        self
    }

    pub fn left_join(
        self,
        target: impl Into<Source>,
        alias: &str,
        on: impl Into<QueryExpr>,
    ) -> Self {
        self.join(JoinKind::Left, target, alias, on)
    }

    pub fn right_join(
        self,
        target: impl Into<Source>,
        alias: &str,
        on: impl Into<QueryExpr>,
    ) -> Self {
        self.join(JoinKind::Right, target, alias, on)
    }

    pub fn inner_join(
        self,
        target: impl Into<Source>,
        alias: &str,
        on: impl Into<QueryExpr>,
    ) -> Self {
        self.join(JoinKind::Inner, target, alias, on)
    }

    // ==================== Columns ====================

    /// Replace the projection with `name => expression` pairs.
    pub fn columns<I, K, E>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (K, E)>,
        K: Into<String>,
        E: Into<QueryExpr>,
    {
        self.columns.clear();
        self.add_columns(columns)
    }

    /// Add `name => expression` pairs; an existing name is overwritten in place.
    pub fn add_columns<I, K, E>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (K, E)>,
        K: Into<String>,
        E: Into<QueryExpr>,
    {
        for (name, expr) in columns {
            let sql = self.absorb(expr.into());
            self.set_column(name.into(), Column::Expr(sql));
        }
        self
    }

    /// Project every column of `M` (read from `alias`) under the `prop` prefix.
    pub fn add_model_column<M: Model>(mut self, prop: &str, alias: &str) -> Self {
        self.set_column(
            prop.to_string(),
            Column::Model {
                table: M::table_meta(),
                alias: alias.to_string(),
            },
        );
        self
    }

    /// Project `"alias".*`.
    pub fn all_columns(mut self, alias: &str) -> Self {
        self.set_column(format!("{alias}.*"), Column::All(alias.to_string()));
        self
    }

    fn set_column(&mut self, name: String, column: Column) {
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = column,
            None => self.columns.push((name, column)),
        }
    }

    // ==================== WHERE / HAVING ====================

    /// Replace the WHERE condition.
    pub fn where_(mut self, condition: impl Into<QueryExpr>) -> Self {
        let sql = self.absorb(condition.into());
        self.where_clause = format!("({sql})");
        self
    }

    /// `(<previous>) AND (<condition>)`.
    pub fn and_where(mut self, condition: impl Into<QueryExpr>) -> Self {
        let sql = self.absorb(condition.into());
        self.where_clause = combine(&self.where_clause, " AND ", &sql);
        self
    }

    /// `(<previous>) OR (<condition>)`.
    pub fn or_where(mut self, condition: impl Into<QueryExpr>) -> Self {
        let sql = self.absorb(condition.into());
        self.where_clause = combine(&self.where_clause, " OR ", &sql);
        self
    }

    pub fn having(mut self, condition: impl Into<QueryExpr>) -> Self {
        let sql = self.absorb(condition.into());
        self.having_clause = format!("({sql})");
        self
    }

    pub fn and_having(mut self, condition: impl Into<QueryExpr>) -> Self {
        let sql = self.absorb(condition.into());
        self.having_clause = combine(&self.having_clause, " AND ", &sql);
        self
    }

    pub fn or_having(mut self, condition: impl Into<QueryExpr>) -> Self {
        let sql = self.absorb(condition.into());
        self.having_clause = combine(&self.having_clause, " OR ", &sql);
        self
    }

    // ==================== Parameters ====================

    /// Bind a parameter referenced by a plain-string fragment.
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn bind_all(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    fn absorb(&mut self, expr: QueryExpr) -> String {
        let (sql, params) = expr.into_parts();
        self.params.extend(params);
        sql
    }

    // ==================== GROUP / ORDER / LIMIT ====================

    pub fn group_by<I, E>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<QueryExpr>,
    {
        self.group_by.clear();
        for field in fields {
            let sql = self.absorb(field.into());
            self.group_by.push(sql);
        }
        self
    }

    /// Replace the ordering, e.g. `order_by(["u.created_at DESC"])`.
    pub fn order_by<I, E>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<QueryExpr>,
    {
        self.order_by.clear();
        self.then_by(fields)
    }

    /// Append to the ordering.
    pub fn then_by<I, E>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<QueryExpr>,
    {
        for field in fields {
            let sql = self.absorb(field.into());
            self.order_by.push(sql);
        }
        self
    }

    pub fn limit(mut self, limit: u64, offset: u64) -> Self {
        self.limit = Some((limit, offset));
        self
    }

    /// Lock the selected rows; `None` clears a previous lock.
    pub fn lock_rows(mut self, mode: impl Into<Option<LockMode>>) -> Self {
        self.lock = mode.into();
        self
    }

    // ==================== Accessors ====================

    /// FROM and at least one column are set.
    pub fn is_valid(&self) -> bool {
        self.from.is_some() && !self.columns.is_empty()
    }

    pub fn where_clause(&self) -> &str {
        &self.where_clause
    }

    pub fn having_clause(&self) -> &str {
        &self.having_clause
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn lock_mode(&self) -> Option<LockMode> {
        self.lock
    }

    // ==================== Build ====================

    /// The SQL template and the merged parameter set.
    pub fn compile(&self) -> OrmResult<(String, Params)> {
        let Some((from, from_alias)) = &self.from else {
            return Err(OrmError::invalid_operation(
                "Query is missing a FROM clause",
            ));
        };
        if self.columns.is_empty() {
            return Err(OrmError::invalid_operation("Query has no columns"));
        }

        let mut params = self.params.clone();

        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|(name, column)| render_column(name, column))
            .collect();
        let mut sql = format!("SELECT {}", columns.join(", "));

        let from = from.render(&mut params)?;
        sql.push_str(&format!(" FROM {from} AS {}", quote_ident(from_alias)));

        for (alias, join) in &self.joins {
            let target = join.target.render(&mut params)?;
            sql.push_str(&format!(
                " {} {target} AS {} ON {}",
                join.kind.as_sql(),
                quote_ident(alias),
                join.on
            ));
        }

        if !self.where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clause);
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if !self.having_clause.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.having_clause);
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }

        if let Some((limit, offset)) = self.limit {
            sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
        }

        if let Some(mode) = self.lock {
            sql.push(' ');
            sql.push_str(mode.as_sql());
        }

        Ok((sql, params))
    }

    /// The compiled statement with parameters substituted.
    pub fn to_sql(&self) -> OrmResult<String> {
        let (sql, params) = self.compile()?;
        populate(&sql, &params)
    }

    // ==================== Execution ====================

    /// Run the query on `db`.
    ///
    /// Fails with [`OrmError::InvalidOperation`] when row locking is requested
    /// outside a transaction.
    pub async fn fetch<C: GenericClient>(&self, db: &mut Adapter<C>) -> OrmResult<Vec<Row>> {
        if self.lock.is_some() && !db.in_transaction() {
            return Err(OrmError::invalid_operation(
                "Row locking is only valid within a transaction",
            ));
        }
        let (sql, params) = self.compile()?;
        db.query(&sql, &params).await
    }

    pub async fn fetch_as<T: FromRow, C: GenericClient>(
        &self,
        db: &mut Adapter<C>,
    ) -> OrmResult<Vec<T>> {
        let rows = self.fetch(db).await?;
        rows.iter().map(T::from_row).collect()
    }

    /// Run the query and read one model per row from the [`SINGLE_RESULT`]
    /// columns.
    pub async fn fetch_models<M: Model, C: GenericClient>(
        &self,
        db: &mut Adapter<C>,
    ) -> OrmResult<Vec<Record<M>>> {
        let rows = self.fetch(db).await?;
        rows.iter()
            .map(|row| row.model::<M>(SINGLE_RESULT).map(Record::existing))
            .collect()
    }
}

fn combine(existing: &str, op: &str, condition: &str) -> String {
    if existing.is_empty() {
        format!("({condition})")
    } else {
        format!("({existing}{op}({condition}))")
    }
}

fn render_column(name: &str, column: &Column) -> String {
    match column {
        Column::Expr(sql) => format!("{sql} AS {}", quote_ident(name)),
        Column::Model { table, alias } => {
            let alias = quote_ident(alias);
            table
                .columns
                .iter()
                .map(|c| {
                    format!(
                        "{alias}.{} AS {}",
                        quote_ident(c.column),
                        quote_ident(&format!("{name}_{}", c.column))
                    )
                })
                .collect::<Vec<_>>()
                .join(", ")
        }
        Column::All(alias) => format!("{}.*", quote_ident(alias)),
    }
}
