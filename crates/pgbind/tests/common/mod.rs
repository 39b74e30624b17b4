//! In-memory client that records every statement instead of running it.

#![allow(dead_code)]

use pgbind::{GenericClient, OrmError, OrmResult, Row};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct RecordingClient {
    log: Arc<Mutex<Vec<String>>>,
    fail_on: Option<String>,
    affected: u64,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self {
            affected: 1,
            ..Self::default()
        }
    }

    /// Fail every statement starting with `prefix`.
    pub fn failing_on(prefix: &str) -> Self {
        Self {
            fail_on: Some(prefix.to_string()),
            ..Self::new()
        }
    }

    /// Report `affected` rows from `execute`.
    pub fn affecting(affected: u64) -> Self {
        Self {
            affected,
            ..Self::default()
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, sql: &str) -> OrmResult<()> {
        self.log.lock().unwrap().push(sql.to_string());
        match &self.fail_on {
            Some(prefix) if sql.starts_with(prefix.as_str()) => {
                Err(OrmError::Other(format!("refused: {sql}")))
            }
            _ => Ok(()),
        }
    }
}

impl GenericClient for RecordingClient {
    async fn query(&self, sql: &str) -> OrmResult<Vec<Row>> {
        self.record(sql)?;
        Ok(Vec::new())
    }

    async fn execute(&self, sql: &str) -> OrmResult<u64> {
        self.record(sql)?;
        Ok(self.affected)
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        self.record(sql)
    }
}

/// Shared event log for tracked callbacks.
#[derive(Clone, Default)]
pub struct Events(Arc<Mutex<Vec<&'static str>>>);

impl Events {
    pub fn push(&self, label: &'static str) -> impl FnOnce() + Send + 'static {
        let events = self.clone();
        move || events.0.lock().unwrap().push(label)
    }

    pub fn take(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}
