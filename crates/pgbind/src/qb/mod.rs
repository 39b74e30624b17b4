//! SELECT composition over named-placeholder templates.
//!
//! A [`SelectQuery`] collects FROM/JOIN/WHERE/GROUP/HAVING/ORDER/LIMIT parts
//! and a running parameter set. Fragments passed as [`QueryExpr`] bring their
//! own parameters, renamed on construction so that several fragments can
//! reuse the same key names.
//!
//! # Usage
//!
//! ```ignore
//! use pgbind::{params, qb};
//!
//! let recent = qb::select("users", "u")
//!     .columns([("id", "u.id"), ("name", "u.name")])
//!     .where_(qb::expr("u.status = :status:", params! { "status" => "active" }))
//!     .and_where(qb::expr("u.created_at > :since:", params! { "since" => since }))
//!     .order_by(["u.created_at DESC"])
//!     .limit(20, 0)
//!     .fetch(&mut db)
//!     .await?;
//! ```

mod expr;
mod select;


pub use expr::{QueryExpr, expr};
pub use select::{Column, Join, JoinKind, LockMode, SINGLE_RESULT, SelectQuery, Source};

/// Start a SELECT from `source` aliased as `alias`.
pub fn select(source: impl Into<Source>, alias: &str) -> SelectQuery {
    SelectQuery::new().from(source, alias)
}
