//! Shared test utilities for unit tests.
//!
//! [`MockState`] is an in-memory [`QueryState`] that records every call in an [`EventLog`]
//! instead of talking to a database. [`MockSource`] opens mock states that share one log.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{Value as JsonValue, json};

use crate::db::{Command, Connect, QueryLocator, QueryState, Row, Transaction};
use crate::error::{DbError, DbResult};
use crate::models::{BackendKind, ParamValue};

/// Fixed command timeout reported by mock states.
pub const MOCK_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Ordered record of the calls made against mock states.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().expect("event log poisoned").push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().expect("event log poisoned").clone()
    }

    /// Number of events equal to `event`.
    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

#[derive(Debug, Clone, Default)]
struct Failures {
    sql: Option<String>,
    commit: bool,
    rollback: bool,
    close: bool,
    open: bool,
}

pub struct MockState {
    kind: BackendKind,
    locator: QueryLocator,
    transaction: Option<Transaction>,
    log: EventLog,
    failures: Failures,
}

impl MockState {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            locator: QueryLocator::empty(),
            transaction: None,
            log: EventLog::default(),
            failures: Failures::default(),
        }
    }

    pub fn with_locator(mut self, locator: QueryLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Make executing `sql` fail with a database error.
    pub fn failing_on(mut self, sql: impl Into<String>) -> Self {
        self.failures.sql = Some(sql.into());
        self
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }

    fn check_sql(&self, command: &Command) -> DbResult<()> {
        command.ensure_runs_on(self.kind, self.transaction.as_ref())?;
        if self.failures.sql.as_deref() == Some(command.sql()) {
            return Err(DbError::database(
                format!("mock failure for '{}'", command.sql()),
                None,
                "",
            ));
        }
        Ok(())
    }
}

fn param_json(value: Option<&ParamValue>) -> JsonValue {
    match value {
        None => JsonValue::Null,
        Some(ParamValue::Text(s)) => json!(s),
        Some(ParamValue::Int(i)) => json!(i),
        Some(ParamValue::Bool(b)) => json!(b),
        Some(ParamValue::DateTime(dt)) => json!(dt.to_string()),
        Some(ParamValue::Decimal(d)) => json!(d.to_string()),
        Some(ParamValue::Bytes(b)) => json!(b.len()),
    }
}

impl QueryState for MockState {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn locator(&self) -> &QueryLocator {
        &self.locator
    }

    fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    fn command_timeout(&self) -> Option<Duration> {
        Some(MOCK_COMMAND_TIMEOUT)
    }

    fn execute<'s>(&'s mut self, command: &'s Command) -> BoxFuture<'s, DbResult<u64>> {
        Box::pin(async move {
            self.check_sql(command)?;
            self.log.push(format!("execute:{}", command.sql()));
            Ok(1)
        })
    }

    /// Returns one row describing the command: `kind`, `sql`, parameter names and values.
    fn fetch_all<'s>(&'s mut self, command: &'s Command) -> BoxFuture<'s, DbResult<Vec<Row>>> {
        Box::pin(async move {
            self.check_sql(command)?;
            self.log.push(format!("fetch:{}", command.sql()));
            let mut row = Row::new();
            row.insert("kind".into(), json!(self.kind.scheme()));
            row.insert("sql".into(), json!(command.sql()));
            row.insert(
                "params".into(),
                command
                    .parameters()
                    .iter()
                    .map(|p| json!(p.source_name()))
                    .collect(),
            );
            row.insert(
                "values".into(),
                command
                    .parameters()
                    .iter()
                    .map(|p| param_json(p.value()))
                    .collect(),
            );
            Ok(vec![row])
        })
    }

    fn begin_transaction(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            if self.transaction.is_some() {
                return Err(DbError::transaction("already open", ""));
            }
            self.transaction = Some(Transaction::new(self.kind));
            self.log.push("begin");
            Ok(())
        })
    }

    fn commit_transaction(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            if self.transaction.take().is_none() {
                return Ok(());
            }
            self.log.push("commit");
            if self.failures.commit {
                return Err(DbError::database("mock commit failure", None, ""));
            }
            Ok(())
        })
    }

    fn rollback_transaction(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            if self.transaction.take().is_none() {
                return Ok(());
            }
            self.log.push("rollback");
            if self.failures.rollback {
                return Err(DbError::database("mock rollback failure", None, ""));
            }
            Ok(())
        })
    }

    fn close(self) -> BoxFuture<'static, DbResult<()>> {
        Box::pin(async move {
            self.log.push("close");
            if self.failures.close {
                return Err(DbError::connection("mock close failure", ""));
            }
            Ok(())
        })
    }
}

/// Opens [`MockState`]s of one kind that all record into the same log.
#[derive(Clone)]
pub struct MockSource {
    kind: BackendKind,
    locator: QueryLocator,
    log: EventLog,
    failures: Failures,
}

impl MockSource {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            locator: QueryLocator::empty(),
            log: EventLog::default(),
            failures: Failures::default(),
        }
    }

    pub fn with_locator(mut self, locator: QueryLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn failing_on(mut self, sql: impl Into<String>) -> Self {
        self.failures.sql = Some(sql.into());
        self
    }

    pub fn failing_commit(mut self) -> Self {
        self.failures.commit = true;
        self
    }

    pub fn failing_rollback(mut self) -> Self {
        self.failures.rollback = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.failures.close = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.failures.open = true;
        self
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }
}

impl Connect for MockSource {
    type Context = MockState;

    fn open(&self) -> BoxFuture<'_, DbResult<MockState>> {
        Box::pin(async move {
            if self.failures.open {
                return Err(DbError::connection("mock open failure", ""));
            }
            self.log.push("open");
            Ok(MockState {
                kind: self.kind,
                locator: self.locator.clone(),
                transaction: None,
                log: self.log.clone(),
                failures: self.failures.clone(),
            })
        })
    }
}
