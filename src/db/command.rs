//! Native commands.
//!
//! A [`Command`] is query text plus parameters already mapped to one backend's native types.
//! It remembers the backend it was built for and the transaction that was active at build
//! time; executing it anywhere else is a programming error.

use crate::db::context::Transaction;
use crate::db::native::NativeParameter;
use crate::db::state::QueryState;
use crate::error::{DbError, DbResult};
use crate::models::{BackendKind, DbParameter};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    kind: BackendKind,
    sql: String,
    parameters: Vec<NativeParameter>,
    transaction_id: Option<Uuid>,
    timeout: Option<Duration>,
}

impl Command {
    pub fn new(kind: BackendKind, sql: impl Into<String>) -> Self {
        Self {
            kind,
            sql: sql.into(),
            parameters: Vec::new(),
            transaction_id: None,
            timeout: None,
        }
    }

    /// Append parameters, mapped with this command's backend. Positions continue after the
    /// parameters already present.
    pub fn add_parameters(mut self, parameters: &[DbParameter]) -> Self {
        let offset = self.parameters.len();
        let kind = self.kind;
        self.parameters.extend(
            parameters
                .iter()
                .enumerate()
                .map(|(i, p)| NativeParameter::from_descriptor(kind, offset + i + 1, p)),
        );
        self
    }

    pub fn with_transaction(mut self, transaction_id: Option<Uuid>) -> Self {
        self.transaction_id = transaction_id;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &[NativeParameter] {
        &self.parameters
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut [NativeParameter] {
        &mut self.parameters
    }

    pub fn transaction_id(&self) -> Option<Uuid> {
        self.transaction_id
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Check that this command may run on a context of `kind` whose current transaction is
    /// `active`.
    pub fn ensure_runs_on(&self, kind: BackendKind, active: Option<&Transaction>) -> DbResult<()> {
        if self.kind != kind {
            return Err(DbError::unsupported_backend(kind, self.kind));
        }
        if let Some(bound) = self.transaction_id {
            let active_id = active.filter(|t| t.is_active()).map(Transaction::id);
            if active_id != Some(bound) {
                return Err(DbError::transaction(
                    match active_id {
                        Some(id) => {
                            format!("Command is bound to another transaction; active is {id}")
                        }
                        None => "Command is bound to a transaction that is no longer active"
                            .to_string(),
                    },
                    bound.to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Build a command for `state`'s backend, attaching its active transaction and command
/// timeout.
pub fn build_command<S: QueryState>(
    state: &S,
    sql: impl Into<String>,
    parameters: &[DbParameter],
) -> Command {
    Command::new(state.kind(), sql)
        .with_transaction(state.transaction().map(Transaction::id))
        .with_timeout(state.command_timeout())
        .add_parameters(parameters)
}
