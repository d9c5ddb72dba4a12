//! The state a query computation runs against.
//!
//! [`QueryState`] is implemented by [`ConnectionContext`](crate::db::ConnectionContext) for
//! a single backend and by the `OneOf2`/`OneOf3` unions of contexts, which forward every call
//! to their active branch. [`Connect`] opens such a state; sources are typed the same way,
//! so a computation can only be run with a source whose shape matches its state.

use crate::db::command::Command;
use crate::db::context::Transaction;
use crate::db::resources::QueryLocator;
use crate::db::types::Row;
use crate::error::DbResult;
use crate::models::BackendKind;
use futures_util::future::BoxFuture;
use std::time::Duration;

pub trait QueryState: Send + Sized + 'static {
    /// Backend of the active connection.
    fn kind(&self) -> BackendKind;

    fn locator(&self) -> &QueryLocator;

    /// The active transaction, if one was begun.
    fn transaction(&self) -> Option<&Transaction>;

    fn command_timeout(&self) -> Option<Duration>;

    fn execute<'s>(&'s mut self, command: &'s Command) -> BoxFuture<'s, DbResult<u64>>;

    fn fetch_all<'s>(&'s mut self, command: &'s Command) -> BoxFuture<'s, DbResult<Vec<Row>>>;

    fn begin_transaction(&mut self) -> BoxFuture<'_, DbResult<()>>;

    /// Commit the active transaction. No-op without one.
    fn commit_transaction(&mut self) -> BoxFuture<'_, DbResult<()>>;

    /// Roll back the active transaction. No-op without one.
    fn rollback_transaction(&mut self) -> BoxFuture<'_, DbResult<()>>;

    /// Close the connection. Consumes the state, so it happens at most once.
    fn close(self) -> BoxFuture<'static, DbResult<()>>;
}

/// Something a [`QueryState`] can be opened from.
pub trait Connect: Send + Sync {
    type Context: QueryState;

    fn open(&self) -> BoxFuture<'_, DbResult<Self::Context>>;
}

impl<C: Connect + ?Sized> Connect for &C {
    type Context = C::Context;

    fn open(&self) -> BoxFuture<'_, DbResult<Self::Context>> {
        (**self).open()
    }
}

impl<C: Connect + ?Sized> Connect for std::sync::Arc<C> {
    type Context = C::Context;

    fn open(&self) -> BoxFuture<'_, DbResult<Self::Context>> {
        (**self).open()
    }
}
