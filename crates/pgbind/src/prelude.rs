//! Common imports.
//!
//! ```ignore
//! use pgbind::prelude::*;
//! ```

pub use crate::{
    Adapter, AdapterConfig, FromRow, GenericClient, LockMode, Model, ModelCache, OrmError,
    OrmResult, Params, Record, RowExt, SelectQuery, TrackType, Value, params, transaction,
};

#[cfg(feature = "pool")]
pub use crate::{create_pool, create_pool_with_config};
