//! The query computation type.

use crate::db::QueryState;
use crate::error::{DbError, DbResult};
use futures_util::future::{self, BoxFuture, FutureExt};

type Step<T, S> = Box<dyn for<'s> FnOnce(&'s mut S) -> BoxFuture<'s, DbResult<T>> + Send>;

/// A pending database operation producing a `T` from a state `S`.
///
/// Nothing touches a connection until the value is run by one of the drivers
/// ([`run`](Queries::run), [`run_with_transaction`](Queries::run_with_transaction),
/// [`run_with_transaction_result`](Queries::run_with_transaction_result),
/// [`into_stream`](Queries::into_stream)). Steps composed with [`and_then`](Queries::and_then)
/// run in order on the same state, so later steps see the connection and transaction left
/// by earlier ones.
#[must_use = "queries do nothing until run"]
pub struct Queries<T, S> {
    step: Step<T, S>,
}

impl<T, S> Queries<T, S>
where
    T: Send + 'static,
    S: QueryState,
{
    pub fn new<F>(step: F) -> Self
    where
        F: for<'s> FnOnce(&'s mut S) -> BoxFuture<'s, DbResult<T>> + Send + 'static,
    {
        Self {
            step: Box::new(step),
        }
    }

    /// A computation that yields `value` without touching the state.
    pub fn value(value: T) -> Self {
        Self::new(move |_: &mut S| future::ready(Ok(value)).boxed())
    }

    /// A computation that fails with `error`.
    pub fn fail(error: DbError) -> Self {
        Self::new(move |_: &mut S| future::ready(Err(error)).boxed())
    }

    /// Run this computation on an already-open state.
    pub fn run_on(self, state: &mut S) -> BoxFuture<'_, DbResult<T>> {
        (self.step)(state)
    }

    pub fn map<U, F>(self, f: F) -> Queries<U, S>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Queries::new(move |state: &mut S| {
            async move {
                let value = self.run_on(state).await?;
                Ok(f(value))
            }
            .boxed()
        })
    }

    /// Sequence: run this computation, then the one `f` builds from its value.
    pub fn and_then<U, F>(self, f: F) -> Queries<U, S>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Queries<U, S> + Send + 'static,
    {
        Queries::new(move |state: &mut S| {
            async move {
                let value = self.run_on(&mut *state).await?;
                f(value).run_on(state).await
            }
            .boxed()
        })
    }

    /// Run both computations in order and pair their values.
    pub fn zip<U>(self, other: Queries<U, S>) -> Queries<(T, U), S>
    where
        U: Send + 'static,
    {
        self.and_then(move |first| other.map(move |second| (first, second)))
    }

    /// Run only when `condition` holds; otherwise yield `T::default()`.
    pub fn run_if(self, condition: bool) -> Self
    where
        T: Default,
    {
        if condition {
            self
        } else {
            Self::default_value()
        }
    }

    /// Run only when `condition` holds; otherwise yield `alternative`.
    pub fn run_if_or(self, condition: bool, alternative: T) -> Self {
        if condition { self } else { Self::value(alternative) }
    }

    /// Turn selected errors into a domain failure.
    ///
    /// `handler` returns `Ok(e)` to yield `Err(e)` as the computation's value, or gives the
    /// error back to keep propagating it.
    pub fn catch<E, H>(self, handler: H) -> Queries<Result<T, E>, S>
    where
        E: Send + 'static,
        H: FnOnce(DbError) -> Result<E, DbError> + Send + 'static,
    {
        Queries::new(move |state: &mut S| {
            async move {
                match self.run_on(state).await {
                    Ok(value) => Ok(Ok(value)),
                    Err(error) => handler(error).map(Err),
                }
            }
            .boxed()
        })
    }
}

impl<T, S> Queries<T, S>
where
    T: Default + Send + 'static,
    S: QueryState,
{
    pub fn default_value() -> Self {
        Self::value(T::default())
    }
}

impl<S: QueryState> Queries<(), S> {
    pub fn unit() -> Self {
        Self::value(())
    }
}

impl<T, E, S> Queries<Result<T, E>, S>
where
    T: Send + 'static,
    E: Send + 'static,
    S: QueryState,
{
    /// Transform the success value; a domain failure passes through.
    pub fn map_ok<U, F>(self, f: F) -> Queries<Result<U, E>, S>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.map(|result| result.map(f))
    }

    /// Continue with `f` on success; a domain failure skips the rest of the chain.
    pub fn and_then_ok<U, F>(self, f: F) -> Queries<Result<U, E>, S>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Queries<Result<U, E>, S> + Send + 'static,
    {
        self.and_then(|result| match result {
            Ok(value) => f(value),
            Err(error) => Queries::value(Err(error)),
        })
    }
}

impl<T, S> std::fmt::Debug for Queries<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queries").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::build_command;
    use crate::models::BackendKind;
    use crate::test_utils::MockState;
    use rand::Rng;

    /// Executes `sql` and yields how many statements the state has run so far.
    fn step(sql: &'static str) -> Queries<usize, MockState> {
        Queries::new(move |state: &mut MockState| {
            async move {
                let command = build_command(state, sql, &[]);
                state.execute(&command).await?;
                Ok(state.log().events().len())
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_value_and_map() {
        let mut state = MockState::new(BackendKind::Sqlite);
        let value = Queries::value(20).map(|v| v + 1).map(|v| v * 2);
        assert_eq!(value.run_on(&mut state).await.unwrap(), 42);
        assert!(state.log().events().is_empty());
    }

    #[tokio::test]
    async fn test_and_then_threads_state() {
        let mut state = MockState::new(BackendKind::Postgres);
        let chain = step("A")
            .and_then(|n| step("B").map(move |m| (n, m)))
            .and_then(|(n, m)| step("C").map(move |k| vec![n, m, k]));
        assert_eq!(chain.run_on(&mut state).await.unwrap(), [1, 2, 3]);
        assert_eq!(
            state.log().events(),
            ["execute:A", "execute:B", "execute:C"]
        );
    }

    #[tokio::test]
    async fn test_error_short_circuits() {
        let mut state = MockState::new(BackendKind::Postgres).failing_on("B");
        let chain = step("A").and_then(|_| step("B")).and_then(|_| step("C"));
        let err = chain.run_on(&mut state).await.unwrap_err();
        assert!(matches!(err, DbError::Database { .. }));
        assert_eq!(state.log().events(), ["execute:A"]);
    }

    #[tokio::test]
    async fn test_zip_runs_in_order() {
        let mut state = MockState::new(BackendKind::MySql);
        let (a, b) = step("A").zip(step("B")).run_on(&mut state).await.unwrap();
        assert_eq!((a, b), (1, 2));
    }

    #[tokio::test]
    async fn test_run_if() {
        let mut state = MockState::new(BackendKind::Sqlite);
        assert_eq!(step("A").run_if(false).run_on(&mut state).await.unwrap(), 0);
        assert_eq!(
            step("A").run_if_or(false, 99).run_on(&mut state).await.unwrap(),
            99
        );
        assert!(state.log().events().is_empty());
        assert_eq!(step("A").run_if(true).run_on(&mut state).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unit_and_default() {
        let mut state = MockState::new(BackendKind::Sqlite);
        Queries::unit().run_on(&mut state).await.unwrap();
        let empty: Vec<String> = Queries::default_value().run_on(&mut state).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_catch_converts_selected_errors() {
        let mut state = MockState::new(BackendKind::Sqlite).failing_on("B");
        let caught = step("B")
            .catch(|err| match err {
                DbError::Database { message, .. } => Ok(message),
                other => Err(other),
            })
            .run_on(&mut state)
            .await
            .unwrap();
        assert!(caught.unwrap_err().contains("mock failure"));

        let rethrown = Queries::<(), MockState>::fail(DbError::internal("boom"))
            .catch(|err| match err {
                DbError::Database { message, .. } => Ok(message),
                other => Err(other),
            })
            .run_on(&mut state)
            .await;
        assert!(matches!(rethrown, Err(DbError::Internal { .. })));
    }

    #[tokio::test]
    async fn test_domain_failure_skips_rest() {
        let mut state = MockState::new(BackendKind::Sqlite);
        let chain = step("A")
            .map(|n| if n == 1 { Err("first") } else { Ok(n) })
            .and_then_ok(|n| step("B").map(move |m| Ok(n + m)))
            .map_ok(|total| total * 10);
        assert_eq!(chain.run_on(&mut state).await.unwrap(), Err("first"));
        assert_eq!(state.log().events(), ["execute:A"]);

        let chain = step("A")
            .map(Ok::<usize, &str>)
            .and_then_ok(|n| step("B").map(move |m| Ok(n + m)))
            .map_ok(|total| total * 10);
        assert_eq!(chain.run_on(&mut state).await.unwrap(), Ok(50));
    }

    fn left_nested(len: usize) -> Queries<usize, MockState> {
        (1..len).fold(step("S"), |chain, _| chain.and_then(|_| step("S")))
    }

    fn right_nested(remaining: usize) -> Queries<usize, MockState> {
        if remaining <= 1 {
            step("S")
        } else {
            step("S").and_then(move |_| right_nested(remaining - 1))
        }
    }

    #[tokio::test]
    async fn test_bind_is_associative_for_random_lengths() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let len = rng.gen_range(1..64);

            let mut left = MockState::new(BackendKind::Postgres);
            let mut right = MockState::new(BackendKind::Postgres);
            let l = left_nested(len).run_on(&mut left).await.unwrap();
            let r = right_nested(len).run_on(&mut right).await.unwrap();

            assert_eq!(l, len);
            assert_eq!(r, len);
            assert_eq!(left.log().events(), right.log().events());
        }
    }
}
