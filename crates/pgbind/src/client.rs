//! Generic client trait for the connection behind an [`Adapter`](crate::Adapter).
//!
//! The adapter renders every statement to literal SQL before sending it, so the
//! client surface is small: run a statement for rows, run one for an affected-row
//! count, or run transaction-control statements.

use crate::error::{OrmError, OrmResult};
use tokio_postgres::Row;

/// A connection able to run fully-rendered SQL text.
pub trait GenericClient: Send + Sync {
    /// Execute a query and return all rows.
    fn query(&self, sql: &str) -> impl std::future::Future<Output = OrmResult<Vec<Row>>> + Send;

    /// Execute a statement and return the number of affected rows.
    fn execute(&self, sql: &str) -> impl std::future::Future<Output = OrmResult<u64>> + Send;

    /// Run transaction-control statements (`BEGIN`, `SAVEPOINT ...`) over the
    /// simple query protocol.
    fn batch_execute(&self, sql: &str) -> impl std::future::Future<Output = OrmResult<()>> + Send;
}

impl GenericClient for tokio_postgres::Client {
    async fn query(&self, sql: &str) -> OrmResult<Vec<Row>> {
        tokio_postgres::Client::query(self, sql, &[])
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn execute(&self, sql: &str) -> OrmResult<u64> {
        tokio_postgres::Client::execute(self, sql, &[])
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        tokio_postgres::Client::batch_execute(self, sql)
            .await
            .map_err(OrmError::from_db_error)
    }
}

impl GenericClient for tokio_postgres::Transaction<'_> {
    async fn query(&self, sql: &str) -> OrmResult<Vec<Row>> {
        tokio_postgres::Transaction::query(self, sql, &[])
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn execute(&self, sql: &str) -> OrmResult<u64> {
        tokio_postgres::Transaction::execute(self, sql, &[])
            .await
            .map_err(OrmError::from_db_error)
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        tokio_postgres::Transaction::batch_execute(self, sql)
            .await
            .map_err(OrmError::from_db_error)
    }
}

// ===== deadpool-postgres support =====

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Client {
    async fn query(&self, sql: &str) -> OrmResult<Vec<Row>> {
        GenericClient::query(&***self, sql).await
    }

    async fn execute(&self, sql: &str) -> OrmResult<u64> {
        GenericClient::execute(&***self, sql).await
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        GenericClient::batch_execute(&***self, sql).await
    }
}

// ===== Reference implementations =====

impl<C: GenericClient> GenericClient for &C {
    fn query(&self, sql: &str) -> impl std::future::Future<Output = OrmResult<Vec<Row>>> + Send {
        (*self).query(sql)
    }

    fn execute(&self, sql: &str) -> impl std::future::Future<Output = OrmResult<u64>> + Send {
        (*self).execute(sql)
    }

    fn batch_execute(&self, sql: &str) -> impl std::future::Future<Output = OrmResult<()>> + Send {
        (*self).batch_execute(sql)
    }
}
