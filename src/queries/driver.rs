//! Execution drivers.
//!
//! Each driver opens one context from a [`Connect`] source, runs the computation on it and
//! closes it exactly once, whatever the outcome. The transactional drivers decide between
//! commit and rollback from the computation's result.

use crate::db::{Connect, QueryState};
use crate::error::DbResult;
use crate::queries::Queries;
use tracing::{debug, warn};

/// Close a context, logging a failure instead of masking the run's outcome.
pub(crate) async fn close_context<S: QueryState>(context: S) {
    let kind = context.kind();
    if let Err(e) = context.close().await {
        warn!(backend = %kind, error = %e, "Failed to close connection");
    }
}

async fn rollback_logged<S: QueryState>(context: &mut S, reason: &str) {
    if let Err(e) = context.rollback_transaction().await {
        warn!(
            backend = %context.kind(),
            reason,
            error = %e,
            "Rollback failed"
        );
    }
}

/// Run `queries` in a transaction, committing when `commit_if` approves the value.
async fn transact<T, S, C>(
    queries: Queries<T, S>,
    source: &C,
    commit_if: impl FnOnce(&T) -> bool,
) -> DbResult<T>
where
    T: Send + 'static,
    S: QueryState,
    C: Connect<Context = S> + ?Sized,
{
    let mut context = source.open().await?;
    if let Err(e) = context.begin_transaction().await {
        close_context(context).await;
        return Err(e);
    }

    let outcome = match queries.run_on(&mut context).await {
        Ok(value) if commit_if(&value) => match context.commit_transaction().await {
            Ok(()) => Ok(value),
            Err(e) => {
                rollback_logged(&mut context, "commit failed").await;
                Err(e)
            }
        },
        Ok(value) => {
            debug!(backend = %context.kind(), "Domain failure, rolling back");
            rollback_logged(&mut context, "domain failure").await;
            Ok(value)
        }
        Err(e) => {
            debug!(backend = %context.kind(), error = %e, "Query failed, rolling back");
            rollback_logged(&mut context, "query error").await;
            Err(e)
        }
    };

    close_context(context).await;
    outcome
}

impl<T, S> Queries<T, S>
where
    T: Send + 'static,
    S: QueryState,
{
    /// Open a context, run, close. No transaction is begun.
    pub async fn run<C>(self, source: &C) -> DbResult<T>
    where
        C: Connect<Context = S> + ?Sized,
    {
        let mut context = source.open().await?;
        let result = self.run_on(&mut context).await;
        close_context(context).await;
        result
    }

    /// Run inside a transaction: commit on success, roll back and return the error
    /// unchanged on failure.
    pub async fn run_with_transaction<C>(self, source: &C) -> DbResult<T>
    where
        C: Connect<Context = S> + ?Sized,
    {
        transact(self, source, |_| true).await
    }
}

impl<T, E, S> Queries<Result<T, E>, S>
where
    T: Send + 'static,
    E: Send + 'static,
    S: QueryState,
{
    /// Run inside a transaction driven by the two-armed result: `Ok(Ok(_))` commits,
    /// `Ok(Err(_))` rolls back and still returns the failure, `Err(_)` rolls back and
    /// propagates.
    pub async fn run_with_transaction_result<C>(self, source: &C) -> DbResult<Result<T, E>>
    where
        C: Connect<Context = S> + ?Sized,
    {
        transact(self, source, Result::is_ok).await
    }
}
