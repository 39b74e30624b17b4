//! Nested transactions and commit/abort tracking.
//!
//! The first [`start_transaction`](crate::Adapter::start_transaction) opens a real
//! transaction; every nested start creates a savepoint (`point_1`, `point_2`, ...).
//! Each level is a [`Frame`] holding callbacks registered through
//! [`track_model`](crate::Adapter::track_model).
//!
//! Committing a savepoint frame does not make anything durable, so its callbacks
//! move into the parent frame and only fire once the outermost transaction
//! commits (or aborts). Aborting any frame fires that frame's `Aborted` callbacks
//! straight away.
//!
//! # Example
//!
//! ```ignore
//! use pgbind::{OrmResult, TrackType, params};
//!
//! # async fn demo(db: &mut pgbind::Adapter<tokio_postgres::Client>) -> OrmResult<()> {
//! pgbind::transaction!(db, {
//!     db.execute(
//!         "UPDATE accounts SET balance = balance - :amount: WHERE id = :id:",
//!         &params! { "amount" => 100, "id" => 1 },
//!     )
//!     .await?;
//!     db.track_model(TrackType::Committed, || println!("debited"));
//!     Ok(())
//! })?;
//! # Ok(()) }
//! ```

use std::fmt;

/// Callback registered against a transaction outcome.
pub type TrackCallback = Box<dyn FnOnce() + Send + 'static>;

/// Which outcome a tracked callback waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    Committed,
    Aborted,
}

/// Runs the given block inside a transaction on an [`Adapter`](crate::Adapter).
///
/// - Starts a transaction (or a savepoint when one is already open).
/// - Commits on `Ok(_)`.
/// - Aborts on `Err(_)`, then returns the error.
///
/// The block must evaluate to `pgbind::OrmResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($db:ident, $body:block) => {{
        $db.start_transaction().await?;

        let __pgbind_tx_result: $crate::OrmResult<_> = async { $body }.await;
        match __pgbind_tx_result {
            Ok(value) => {
                $db.commit_transaction().await?;
                Ok(value)
            }
            Err(error) => match $db.abort_transaction().await {
                Ok(()) => Err(error),
                Err(abort_err) => Err($crate::OrmError::Other(format!(
                    "{error} (abort failed: {abort_err})"
                ))),
            },
        }
    }};
}

/// One level of transaction nesting.
#[derive(Default)]
pub struct Frame {
    savepoint: Option<String>,
    committed: Vec<TrackCallback>,
    aborted: Vec<TrackCallback>,
}

impl Frame {
    fn base() -> Self {
        Self::default()
    }

    fn savepoint(name: String) -> Self {
        Self {
            savepoint: Some(name),
            ..Self::default()
        }
    }

    /// Savepoint backing this frame; `None` for the outermost transaction.
    pub fn savepoint_name(&self) -> Option<&str> {
        self.savepoint.as_deref()
    }

    /// Number of callbacks waiting on `track`.
    pub fn tracked(&self, track: TrackType) -> usize {
        match track {
            TrackType::Committed => self.committed.len(),
            TrackType::Aborted => self.aborted.len(),
        }
    }

    fn push(&mut self, track: TrackType, callback: TrackCallback) {
        match track {
            TrackType::Committed => self.committed.push(callback),
            TrackType::Aborted => self.aborted.push(callback),
        }
    }

    /// Consume the frame, keeping only the callbacks for `track`.
    pub fn into_callbacks(self, track: TrackType) -> Vec<TrackCallback> {
        match track {
            TrackType::Committed => self.committed,
            TrackType::Aborted => self.aborted,
        }
    }

    fn merge_into(self, parent: &mut Frame) {
        parent.committed.extend(self.committed);
        parent.aborted.extend(self.aborted);
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("savepoint", &self.savepoint)
            .field("committed", &self.committed.len())
            .field("aborted", &self.aborted.len())
            .finish()
    }
}

/// Statement required to open a new frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin {
    Transaction,
    Savepoint(String),
}

/// Connection-free bookkeeping for nested transactions.
#[derive(Debug, Default)]
pub struct TransactionStack {
    frames: Vec<Frame>,
}

impl TransactionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Push a frame and report which statement opens it.
    pub fn begin(&mut self) -> Begin {
        if self.frames.is_empty() {
            self.frames.push(Frame::base());
            Begin::Transaction
        } else {
            let name = format!("point_{}", self.frames.len());
            self.frames.push(Frame::savepoint(name.clone()));
            Begin::Savepoint(name)
        }
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Hand a released savepoint's callbacks to the frame now on top.
    ///
    /// With no frame left the callbacks are dropped.
    pub fn merge_released(&mut self, frame: Frame) {
        if let Some(parent) = self.frames.last_mut() {
            frame.merge_into(parent);
        }
    }

    /// Register a callback. Returns it back when it should fire right away
    /// (a `Committed` callback outside any transaction).
    pub fn track(&mut self, track: TrackType, callback: TrackCallback) -> Option<TrackCallback> {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.push(track, callback);
                None
            }
            None => match track {
                TrackType::Committed => Some(callback),
                TrackType::Aborted => None,
            },
        }
    }
}

pub(crate) fn fire(callbacks: Vec<TrackCallback>) {
    for callback in callbacks {
        callback();
    }
}
