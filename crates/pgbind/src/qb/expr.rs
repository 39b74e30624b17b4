//! Parameterized SQL fragments.

use crate::error::OrmResult;
use crate::qb::select::SelectQuery;
use crate::template::{populate, rename_placeholder};
use crate::value::Params;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_EXPR_ID: AtomicU64 = AtomicU64::new(1);

/// A SQL fragment carrying its own parameters.
///
/// Construction renames every parameter `k` to `expr<N>_k` (and rewrites the
/// matching `:k:` placeholders), so fragments built from the same key names
/// can be combined into one query without colliding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryExpr {
    sql: String,
    params: Params,
}

impl QueryExpr {
    pub fn new(sql: impl Into<String>, params: Params) -> Self {
        let mut sql = sql.into();
        if params.is_empty() {
            return Self { sql, params };
        }

        let id = NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed);
        let mut renamed = Params::new();
        for (key, value) in params {
            let new_key = format!("expr{id}_{key}");
            sql = rename_placeholder(&sql, &key, &new_key);
            renamed.insert(new_key, value);
        }

        Self {
            sql,
            params: renamed,
        }
    }

    /// A fragment without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::new(),
        }
    }

    /// Compile `query` into a fragment usable as a subquery.
    pub fn from_builder(query: &SelectQuery) -> OrmResult<Self> {
        let (sql, params) = query.compile()?;
        Ok(Self::new(sql, params))
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn into_parts(self) -> (String, Params) {
        (self.sql, self.params)
    }

    /// The fragment with its parameters substituted.
    pub fn populated(&self) -> OrmResult<String> {
        populate(&self.sql, &self.params)
    }
}

impl From<&str> for QueryExpr {
    fn from(sql: &str) -> Self {
        Self::raw(sql)
    }
}

impl From<String> for QueryExpr {
    fn from(sql: String) -> Self {
        Self::raw(sql)
    }
}

impl From<&String> for QueryExpr {
    fn from(sql: &String) -> Self {
        Self::raw(sql.as_str())
    }
}

/// Shorthand for [`QueryExpr::new`].
pub fn expr(sql: impl Into<String>, params: Params) -> QueryExpr {
    QueryExpr::new(sql, params)
}
