//! Backend alternation.
//!
//! A computation that must work on several backends is written once against a union state.
//! `OneOf2<A, B>` holds exactly one active branch; three alternatives nest as
//! `OneOf2<OneOf2<A, B>, C>` ([`OneOf3`]). Unions of states implement [`QueryState`] and
//! unions of sources implement [`Connect`] by forwarding to the active branch, so a
//! computation over `OneOf2<ConnectionContext<PgBackend>, ConnectionContext<SqliteBackend>>`
//! runs with a `OneOf2<ConnectionSource<PgBackend>, ConnectionSource<SqliteBackend>>` and
//! nothing else.

use crate::db::{Command, Connect, QueryLocator, QueryState, Row, Transaction};
use crate::error::DbResult;
use crate::models::BackendKind;
use crate::queries::CommandFactory;
use futures_util::future::{BoxFuture, FutureExt};
use std::time::Duration;

/// Exactly one of two alternatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneOf2<A, B> {
    First(A),
    Second(B),
}

/// Exactly one of three alternatives.
pub type OneOf3<A, B, C> = OneOf2<OneOf2<A, B>, C>;

impl<A, B> OneOf2<A, B> {
    /// Consume the union with one function per branch.
    pub fn fold<R>(self, first: impl FnOnce(A) -> R, second: impl FnOnce(B) -> R) -> R {
        match self {
            Self::First(a) => first(a),
            Self::Second(b) => second(b),
        }
    }

    pub fn as_ref(&self) -> OneOf2<&A, &B> {
        match self {
            Self::First(a) => OneOf2::First(a),
            Self::Second(b) => OneOf2::Second(b),
        }
    }
}

pub fn first3<A, B, C>(value: A) -> OneOf3<A, B, C> {
    OneOf2::First(OneOf2::First(value))
}

pub fn second3<A, B, C>(value: B) -> OneOf3<A, B, C> {
    OneOf2::First(OneOf2::Second(value))
}

pub fn third3<A, B, C>(value: C) -> OneOf3<A, B, C> {
    OneOf2::Second(value)
}

/// Dispatch an expression to whichever branch is active.
macro_rules! dispatch {
    ($union:expr, $inner:ident => $body:expr) => {
        match $union {
            OneOf2::First($inner) => $body,
            OneOf2::Second($inner) => $body,
        }
    };
}

impl<A: QueryState, B: QueryState> QueryState for OneOf2<A, B> {
    fn kind(&self) -> BackendKind {
        dispatch!(self, state => state.kind())
    }

    fn locator(&self) -> &QueryLocator {
        dispatch!(self, state => state.locator())
    }

    fn transaction(&self) -> Option<&Transaction> {
        dispatch!(self, state => state.transaction())
    }

    fn command_timeout(&self) -> Option<Duration> {
        dispatch!(self, state => state.command_timeout())
    }

    fn execute<'s>(&'s mut self, command: &'s Command) -> BoxFuture<'s, DbResult<u64>> {
        dispatch!(self, state => state.execute(command))
    }

    fn fetch_all<'s>(&'s mut self, command: &'s Command) -> BoxFuture<'s, DbResult<Vec<Row>>> {
        dispatch!(self, state => state.fetch_all(command))
    }

    fn begin_transaction(&mut self) -> BoxFuture<'_, DbResult<()>> {
        dispatch!(self, state => state.begin_transaction())
    }

    fn commit_transaction(&mut self) -> BoxFuture<'_, DbResult<()>> {
        dispatch!(self, state => state.commit_transaction())
    }

    fn rollback_transaction(&mut self) -> BoxFuture<'_, DbResult<()>> {
        dispatch!(self, state => state.rollback_transaction())
    }

    fn close(self) -> BoxFuture<'static, DbResult<()>> {
        dispatch!(self, state => state.close())
    }
}

impl<A: Connect, B: Connect> Connect for OneOf2<A, B> {
    type Context = OneOf2<A::Context, B::Context>;

    fn open(&self) -> BoxFuture<'_, DbResult<Self::Context>> {
        match self {
            Self::First(source) => source.open().map(|r| r.map(OneOf2::First)).boxed(),
            Self::Second(source) => source.open().map(|r| r.map(OneOf2::Second)).boxed(),
        }
    }
}

impl<S: QueryState> CommandFactory<S> {
    /// Combine with a factory for another state. The result builds with `self` when the
    /// running state is `First` and with `other` when it is `Second`; the other factory is
    /// never invoked.
    pub fn or<S2: QueryState>(self, other: CommandFactory<S2>) -> CommandFactory<OneOf2<S, S2>> {
        CommandFactory::from_fn(move |state: &OneOf2<S, S2>| match state {
            OneOf2::First(state) => self.build(state),
            OneOf2::Second(state) => other.build(state),
        })
    }
}
