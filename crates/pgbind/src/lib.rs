//! # pgbind
//!
//! Named-placeholder SQL for PostgreSQL, with savepoint-nested transactions
//! and a small model layer.
//!
//! ## Features
//!
//! - **Templates**: `:name:` placeholders are replaced by escaped literals;
//!   missing values turn into `NULL`, `IS NULL` or `IS NOT NULL` depending on
//!   the clause
//! - **Nested transactions**: inner `start_transaction` calls become savepoints,
//!   with callbacks fired on the final commit or on abort
//! - **Query builder**: SELECT composition where every fragment carries its own
//!   parameters
//! - **Models**: `#[derive(Model)]` maps structs to tables for find/save/delete
//!
//! ## Templates
//!
//! ```ignore
//! use pgbind::{Adapter, AdapterConfig, params};
//!
//! let mut db = Adapter::connect(&AdapterConfig::from_url(url)).await?;
//!
//! // UPDATE "users" SET "email" = NULL WHERE "id" = 7
//! db.execute(
//!     r#"UPDATE "users" SET "email" = :email: WHERE "id" = :id:"#,
//!     &params! { "id" => 7 },
//! )
//! .await?;
//!
//! // ... WHERE deleted_at IS NULL AND status IN ('a','b')
//! let rows = db
//!     .query(
//!         "SELECT * FROM users WHERE deleted_at = :deleted: AND status IN :status:",
//!         &params! { "status" => vec!["a", "b"] },
//!     )
//!     .await?;
//! ```
//!
//! ## Transactions
//!
//! ```ignore
//! pgbind::transaction!(db, {
//!     db.save(&mut order).await?;
//!     pgbind::transaction!(db, {
//!         // runs inside SAVEPOINT point_1
//!         db.save(&mut line).await?;
//!         Ok(())
//!     })?;
//!     Ok(())
//! })?;
//! ```

pub mod adapter;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod qb;
pub mod row;
pub mod template;
pub mod transaction;
pub mod value;

pub mod prelude;

pub use adapter::{Adapter, BoxFuture};
pub use cache::ModelCache;
pub use client::GenericClient;
pub use config::AdapterConfig;
pub use error::{OrmError, OrmResult};
pub use model::{ColumnMeta, Model, Record, TableMeta, model_query};
pub use qb::{LockMode, QueryExpr, SelectQuery};
pub use row::{FromRow, RowExt};
pub use template::populate;
pub use transaction::{TrackType, TransactionStack};
pub use value::{DATE_FORMAT, DATETIME_FORMAT, ParamKind, Params, ToParam, Value, quote_ident, quote_literal, raw};

pub use tokio_postgres;
pub use tokio_postgres::Row;

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};

#[cfg(feature = "derive")]
pub use pgbind_derive::Model;
