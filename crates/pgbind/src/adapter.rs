//! The database adapter: one connection, template population, and the
//! transaction stack.

use crate::client::GenericClient;
use crate::config::AdapterConfig;
use crate::error::{OrmError, OrmResult};
use crate::template::populate;
use crate::transaction::{Begin, TrackType, TransactionStack, fire};
use crate::value::Params;
use std::future::Future;
use std::pin::Pin;
use tokio_postgres::{NoTls, Row};

/// Boxed future returned by [`Adapter::with_transaction`] closures.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Owns a single connection for the lifetime of a request.
///
/// Every stateful operation takes `&mut self`: the adapter is never shared
/// between tasks.
pub struct Adapter<C> {
    client: C,
    stack: TransactionStack,
    last_query: String,
    last_error: Option<String>,
}

impl Adapter<tokio_postgres::Client> {
    /// Open a dedicated connection and drive it on a background task.
    pub async fn connect(config: &AdapterConfig) -> OrmResult<Self> {
        let pg = config.to_pg_config()?;
        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(|e| OrmError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(_e) = connection.await {
                #[cfg(feature = "tracing")]
                tracing::warn!(target: "pgbind.conn", error = %_e, "connection closed with error");
            }
        });

        Ok(Self::new(client))
    }
}

impl<C: GenericClient> Adapter<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            stack: TransactionStack::new(),
            last_query: String::new(),
            last_error: None,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Release the connection. Any open transaction is left to the server,
    /// which rolls it back when the session ends.
    pub fn into_inner(self) -> C {
        #[cfg(feature = "tracing")]
        if self.stack.is_active() {
            tracing::warn!(
                target: "pgbind.tx",
                depth = self.stack.depth(),
                "adapter released with an open transaction"
            );
        }
        self.client
    }

    /// Render `template` with `params` without executing it.
    pub fn populate_query(&self, template: &str, params: &Params) -> OrmResult<String> {
        populate(template, params)
    }

    /// Populate and run a statement, returning its rows.
    pub async fn query(&mut self, template: &str, params: &Params) -> OrmResult<Vec<Row>> {
        let sql = self.prepare(template, params)?;
        let result = self.client.query(&sql).await;
        self.record(result)
    }

    /// Populate and run a statement, returning the first row.
    pub async fn query_one(&mut self, template: &str, params: &Params) -> OrmResult<Row> {
        self.query(template, params)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OrmError::not_found("Expected one row, got none"))
    }

    /// Populate and run a statement, returning the first row if any.
    pub async fn query_opt(&mut self, template: &str, params: &Params) -> OrmResult<Option<Row>> {
        Ok(self.query(template, params).await?.into_iter().next())
    }

    /// Populate and run a statement, returning the affected row count.
    pub async fn execute(&mut self, template: &str, params: &Params) -> OrmResult<u64> {
        let sql = self.prepare(template, params)?;
        let result = self.client.execute(&sql).await;
        self.record(result)
    }

    /// Error message of the last failed statement, if the last statement failed.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The last statement sent, after population.
    pub fn last_query(&self) -> &str {
        &self.last_query
    }

    fn prepare(&mut self, template: &str, params: &Params) -> OrmResult<String> {
        let sql = populate(template, params)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "pgbind.sql", depth = self.stack.depth(), sql = %sql);
        self.last_query.clone_from(&sql);
        Ok(sql)
    }

    fn record<T>(&mut self, result: OrmResult<T>) -> OrmResult<T> {
        self.last_error = result.as_ref().err().map(ToString::to_string);
        result
    }

    async fn control(&mut self, sql: &str) -> OrmResult<()> {
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "pgbind.tx", depth = self.stack.depth(), sql);
        self.last_query = sql.to_string();
        let result = self.client.batch_execute(sql).await;
        self.record(result)
    }

    // ==================== Transactions ====================

    pub fn in_transaction(&self) -> bool {
        self.stack.is_active()
    }

    /// Number of open frames (0 when idle).
    pub fn transaction_depth(&self) -> usize {
        self.stack.depth()
    }

    /// Begin a transaction, or a savepoint when one is already open.
    pub async fn start_transaction(&mut self) -> OrmResult<()> {
        match self.stack.begin() {
            Begin::Transaction => {
                if let Err(err) = self.control("BEGIN").await {
                    self.stack.pop();
                    return Err(err);
                }
            }
            Begin::Savepoint(name) => {
                if let Err(err) = self.control(&format!("SAVEPOINT {name}")).await {
                    self.stack.pop();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Commit the innermost frame.
    ///
    /// Releasing a savepoint defers its callbacks to the enclosing frame. The
    /// outermost commit fires every `Committed` callback in registration order.
    /// If the final `COMMIT` fails the server has rolled back, so the `Aborted`
    /// callbacks fire instead.
    pub async fn commit_transaction(&mut self) -> OrmResult<()> {
        let Some(frame) = self.stack.pop() else {
            #[cfg(feature = "tracing")]
            tracing::warn!(target: "pgbind.tx", "commit requested with no open transaction");
            return Ok(());
        };

        match frame.savepoint_name().map(str::to_string) {
            Some(name) => {
                let result = self.control(&format!("RELEASE SAVEPOINT {name}")).await;
                self.stack.merge_released(frame);
                result
            }
            None => match self.control("COMMIT").await {
                Ok(()) => {
                    fire(frame.into_callbacks(TrackType::Committed));
                    Ok(())
                }
                Err(err) => {
                    fire(frame.into_callbacks(TrackType::Aborted));
                    Err(err)
                }
            },
        }
    }

    /// Roll back the innermost frame and fire its `Aborted` callbacks.
    ///
    /// A savepoint frame only undoes work since that savepoint; the enclosing
    /// transaction stays open.
    pub async fn abort_transaction(&mut self) -> OrmResult<()> {
        let Some(frame) = self.stack.pop() else {
            #[cfg(feature = "tracing")]
            tracing::warn!(target: "pgbind.tx", "abort requested with no open transaction");
            return Ok(());
        };

        let result = match frame.savepoint_name() {
            Some(name) => {
                let sql = format!("ROLLBACK TO SAVEPOINT {name}");
                self.control(&sql).await
            }
            None => self.control("ROLLBACK").await,
        };

        #[cfg(feature = "tracing")]
        if let Err(err) = &result {
            tracing::warn!(target: "pgbind.tx", error = %err, "rollback failed");
        }

        fire(frame.into_callbacks(TrackType::Aborted));
        result
    }

    /// Run `callback` once the current transaction reaches `track`.
    ///
    /// Outside a transaction every write is already committed: `Committed`
    /// callbacks run immediately and `Aborted` callbacks are dropped.
    pub fn track_model(&mut self, track: TrackType, callback: impl FnOnce() + Send + 'static) {
        if let Some(callback) = self.stack.track(track, Box::new(callback)) {
            callback();
        }
    }

    /// Run `f` inside a transaction: commit on `Ok`, abort on `Err`.
    ///
    /// ```ignore
    /// db.with_transaction(|db| Box::pin(async move {
    ///     db.execute("DELETE FROM sessions WHERE user_id = :id:", &params! { "id" => 1 }).await?;
    ///     Ok(())
    /// }))
    /// .await?;
    /// ```
    pub async fn with_transaction<T, F>(&mut self, f: F) -> OrmResult<T>
    where
        F: for<'c> FnOnce(&'c mut Self) -> BoxFuture<'c, OrmResult<T>>,
    {
        self.start_transaction().await?;

        match f(self).await {
            Ok(value) => {
                self.commit_transaction().await?;
                Ok(value)
            }
            Err(error) => match self.abort_transaction().await {
                Ok(()) => Err(error),
                Err(abort_err) => Err(OrmError::Other(format!(
                    "{error} (abort failed: {abort_err})"
                ))),
            },
        }
    }
}

impl<C> std::fmt::Debug for Adapter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("depth", &self.stack.depth())
            .field("last_query", &self.last_query)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}
