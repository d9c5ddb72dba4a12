//! Connection contexts and transactions.
//!
//! A [`ConnectionContext`] owns one open connection for the duration of a run. Transactions
//! are begun on the connection's [`Session`] with raw `BEGIN`/`COMMIT`/`ROLLBACK`
//! statements; a [`Transaction`] is the handle the rest of the crate uses to refer to one.

use crate::db::backend::Backend;
use crate::db::command::Command;
use crate::db::resources::QueryLocator;
use crate::db::state::QueryState;
use crate::db::types::Row;
use crate::error::{DbError, DbResult};
use crate::models::BackendKind;
use crate::queries::Queries;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of a transaction handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
    /// Replaced by another transaction and released
    Disposed,
}

impl TransactionState {
    /// Check if the transaction is still active.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if the transaction has ended (committed, rolled back, or disposed).
    pub fn is_ended(&self) -> bool {
        !self.is_active()
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Committed => 1,
            Self::RolledBack => 2,
            Self::Disposed => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Active,
            1 => Self::Committed,
            2 => Self::RolledBack,
            _ => Self::Disposed,
        }
    }
}

struct TransactionInner {
    id: Uuid,
    kind: BackendKind,
    started_at: DateTime<Utc>,
    created: Instant,
    state: AtomicU8,
}

/// Handle to a transaction. Clones refer to the same transaction; identity is the handle,
/// not the id.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl Transaction {
    pub(crate) fn new(kind: BackendKind) -> Self {
        Self {
            inner: Arc::new(TransactionInner {
                id: Uuid::new_v4(),
                kind,
                started_at: Utc::now(),
                created: Instant::now(),
                state: AtomicU8::new(TransactionState::Active.to_u8()),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn kind(&self) -> BackendKind {
        self.inner.kind
    }

    pub fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.created.elapsed()
    }

    /// Reference identity: true only for clones of the same handle.
    pub fn same_as(&self, other: &Transaction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn set_state(&self, state: TransactionState) {
        self.inner.state.store(state.to_u8(), Ordering::Release);
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("state", &self.state())
            .finish()
    }
}

/// An open connection and the transaction currently open on it, if any.
pub struct Session<B: Backend> {
    connection: B::Connection,
    open: Option<Transaction>,
}

impl<B: Backend> Session<B> {
    pub(crate) fn new(connection: B::Connection) -> Self {
        Self {
            connection,
            open: None,
        }
    }

    /// The native connection, for driver calls the query layer does not cover.
    pub fn connection(&mut self) -> &mut B::Connection {
        &mut self.connection
    }

    pub fn open_transaction(&self) -> Option<&Transaction> {
        self.open.as_ref().filter(|t| t.is_active())
    }

    /// Begin a transaction. Fails while another one is open on this connection.
    pub async fn begin(&mut self) -> DbResult<Transaction> {
        if let Some(open) = self.open_transaction() {
            return Err(DbError::transaction(
                "A transaction is already open on this connection",
                open.id().to_string(),
            ));
        }
        B::execute_raw(&mut self.connection, B::KIND.begin_statement()).await?;
        let transaction = Transaction::new(B::KIND);
        self.open = Some(transaction.clone());
        info!(
            transaction_id = %transaction.id(),
            backend = %B::KIND,
            "Transaction started"
        );
        Ok(transaction)
    }

    pub async fn commit(&mut self, transaction: &Transaction) -> DbResult<()> {
        self.ensure_open(transaction)?;
        B::execute_raw(&mut self.connection, B::KIND.commit_statement()).await?;
        transaction.set_state(TransactionState::Committed);
        self.open = None;
        info!(
            transaction_id = %transaction.id(),
            elapsed_ms = transaction.elapsed().as_millis() as u64,
            "Transaction committed"
        );
        Ok(())
    }

    pub async fn rollback(&mut self, transaction: &Transaction) -> DbResult<()> {
        self.ensure_open(transaction)?;
        B::execute_raw(&mut self.connection, B::KIND.rollback_statement()).await?;
        transaction.set_state(TransactionState::RolledBack);
        self.open = None;
        info!(
            transaction_id = %transaction.id(),
            elapsed_ms = transaction.elapsed().as_millis() as u64,
            "Transaction rolled back"
        );
        Ok(())
    }

    /// Release a replaced transaction handle, rolling it back if it is still open here.
    pub(crate) async fn dispose(&mut self, transaction: &Transaction) -> DbResult<()> {
        let still_open = self
            .open_transaction()
            .is_some_and(|open| open.same_as(transaction));
        if still_open {
            warn!(
                transaction_id = %transaction.id(),
                "Disposing a transaction that is still open, rolling back"
            );
            self.rollback(transaction).await?;
        }
        transaction.set_state(TransactionState::Disposed);
        debug!(transaction_id = %transaction.id(), "Transaction disposed");
        Ok(())
    }

    fn ensure_open(&self, transaction: &Transaction) -> DbResult<()> {
        match self.open_transaction() {
            Some(open) if open.same_as(transaction) => Ok(()),
            _ => Err(DbError::transaction(
                format!(
                    "Transaction is not open on this connection (state: {:?})",
                    transaction.state()
                ),
                transaction.id().to_string(),
            )),
        }
    }

    pub(crate) async fn close(self) -> DbResult<()> {
        if let Some(open) = self.open.as_ref().filter(|t| t.is_active()) {
            // The server discards the transaction with the connection
            warn!(
                transaction_id = %open.id(),
                "Closing connection with an open transaction"
            );
            open.set_state(TransactionState::Disposed);
        }
        B::close(self.connection).await
    }
}

/// Everything a running computation sees: the connection, the active transaction and the
/// query resources.
pub struct ConnectionContext<B: Backend> {
    session: Session<B>,
    transaction: Option<Transaction>,
    locator: QueryLocator,
    command_timeout: Option<Duration>,
}

impl<B: Backend> ConnectionContext<B> {
    pub fn new(connection: B::Connection, locator: QueryLocator) -> Self {
        Self {
            session: Session::new(connection),
            transaction: None,
            locator,
            command_timeout: None,
        }
    }

    pub fn with_command_timeout(mut self, command_timeout: Option<Duration>) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    pub fn session(&mut self) -> &mut Session<B> {
        &mut self.session
    }

    pub fn connection(&mut self) -> &mut B::Connection {
        self.session.connection()
    }
}

impl<B: Backend> QueryState for ConnectionContext<B> {
    fn kind(&self) -> BackendKind {
        B::KIND
    }

    fn locator(&self) -> &QueryLocator {
        &self.locator
    }

    fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    fn execute<'s>(&'s mut self, command: &'s Command) -> BoxFuture<'s, DbResult<u64>> {
        Box::pin(async move {
            command.ensure_runs_on(B::KIND, self.transaction.as_ref())?;
            debug!(
                sql = %command.sql(),
                params = command.parameters().len(),
                backend = %B::KIND,
                "Executing command"
            );
            B::execute(self.session.connection(), command).await
        })
    }

    fn fetch_all<'s>(&'s mut self, command: &'s Command) -> BoxFuture<'s, DbResult<Vec<Row>>> {
        Box::pin(async move {
            command.ensure_runs_on(B::KIND, self.transaction.as_ref())?;
            debug!(
                sql = %command.sql(),
                params = command.parameters().len(),
                backend = %B::KIND,
                "Executing query"
            );
            B::fetch_all(self.session.connection(), command).await
        })
    }

    fn begin_transaction(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            let transaction = self.session.begin().await?;
            self.transaction = Some(transaction);
            Ok(())
        })
    }

    fn commit_transaction(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            let Some(transaction) = self.transaction.clone() else {
                return Ok(());
            };
            self.session.commit(&transaction).await?;
            self.transaction = None;
            Ok(())
        })
    }

    fn rollback_transaction(&mut self) -> BoxFuture<'_, DbResult<()>> {
        Box::pin(async move {
            let Some(transaction) = self.transaction.clone() else {
                return Ok(());
            };
            self.session.rollback(&transaction).await?;
            self.transaction = None;
            Ok(())
        })
    }

    fn close(self) -> BoxFuture<'static, DbResult<()>> {
        Box::pin(async move {
            let result = self.session.close().await;
            info!(backend = %B::KIND, "Connection closed");
            result
        })
    }
}

/// Replace the context's active transaction with the one `swap` returns.
///
/// Without an active transaction this does nothing. When `swap` returns a different handle
/// than it was given, the old handle is disposed; returning the same handle disposes
/// nothing.
///
/// ```ignore
/// // Commit the work so far and continue in a fresh transaction
/// let checkpoint = set_transaction(|session, current| {
///     Box::pin(async move {
///         session.commit(&current).await?;
///         session.begin().await
///     })
/// });
/// ```
pub fn set_transaction<B, F>(swap: F) -> Queries<(), ConnectionContext<B>>
where
    B: Backend,
    F: for<'c> FnOnce(&'c mut Session<B>, Transaction) -> BoxFuture<'c, DbResult<Transaction>>
        + Send
        + 'static,
{
    Queries::new(move |context: &mut ConnectionContext<B>| {
        Box::pin(async move {
            let Some(current) = context.transaction.clone() else {
                debug!("No active transaction to replace");
                return Ok(());
            };
            let replacement = swap(&mut context.session, current.clone()).await?;
            if !replacement.same_as(&current) {
                context.session.dispose(&current).await?;
                info!(
                    old_transaction_id = %current.id(),
                    new_transaction_id = %replacement.id(),
                    "Transaction replaced"
                );
            }
            context.transaction = Some(replacement);
            Ok(())
        })
    })
}
