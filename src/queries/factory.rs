//! Deferred command construction.

use crate::db::types::first_value;
use crate::db::{Command, QueryState, Row, build_command, resolve_query};
use crate::error::DbResult;
use crate::models::DbParameter;
use crate::queries::Queries;
use futures_util::future::{self, BoxFuture, FutureExt};
use serde_json::Value as JsonValue;
use std::sync::Arc;

type BuildFn<S> = dyn Fn(&S) -> DbResult<Command> + Send + Sync;

/// Builds a [`Command`] for whatever state it is eventually run on.
///
/// Factories are reusable and cheap to clone; building has no side effects. Use
/// [`then`](CommandFactory::then) or one of its shorthands to turn a factory into a
/// [`Queries`] value.
pub struct CommandFactory<S> {
    build: Arc<BuildFn<S>>,
}

impl<S> Clone for CommandFactory<S> {
    fn clone(&self) -> Self {
        Self {
            build: Arc::clone(&self.build),
        }
    }
}

impl<S> std::fmt::Debug for CommandFactory<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandFactory").finish_non_exhaustive()
    }
}

impl<S: QueryState> CommandFactory<S> {
    /// A factory for fixed query text. Placeholders must follow the convention of the backend
    /// the factory is run on.
    pub fn new(sql: impl Into<String>, parameters: impl IntoIterator<Item = DbParameter>) -> Self {
        let sql = sql.into();
        let parameters: Vec<DbParameter> = parameters.into_iter().collect();
        Self::from_fn(move |state: &S| Ok(build_command(state, sql.as_str(), &parameters)))
    }

    /// A factory for the query file `{name}.{extension}` of the state's backend.
    pub fn from_file(
        name: impl Into<String>,
        parameters: impl IntoIterator<Item = DbParameter>,
    ) -> Self {
        Self::from_file_with(name, Vec::<String>::new(), parameters)
    }

    /// Like [`from_file`](Self::from_file), replacing `{0}`, `{1}`, ... in the file with
    /// `substitutions`. The replacement is textual; never pass untrusted input.
    pub fn from_file_with<V>(
        name: impl Into<String>,
        substitutions: impl IntoIterator<Item = V>,
        parameters: impl IntoIterator<Item = DbParameter>,
    ) -> Self
    where
        V: Into<String>,
    {
        let name = name.into();
        let substitutions: Vec<String> = substitutions.into_iter().map(Into::into).collect();
        let parameters: Vec<DbParameter> = parameters.into_iter().collect();
        Self::from_fn(move |state: &S| {
            let sql = resolve_query(state.locator(), &name, state.kind(), &substitutions)?;
            Ok(build_command(state, sql, &parameters))
        })
    }

    pub fn from_fn<F>(build: F) -> Self
    where
        F: Fn(&S) -> DbResult<Command> + Send + Sync + 'static,
    {
        Self {
            build: Arc::new(build),
        }
    }

    pub fn build(&self, state: &S) -> DbResult<Command> {
        (self.build)(state)
    }

    /// Append parameters after the command is built, mapped for the backend it was built
    /// for. Used after [`or`](Self::or) to share parameters between alternatives.
    pub fn add_parameters(self, parameters: impl IntoIterator<Item = DbParameter>) -> Self {
        let parameters: Vec<DbParameter> = parameters.into_iter().collect();
        Self::from_fn(move |state: &S| Ok(self.build(state)?.add_parameters(&parameters)))
    }

    /// Build the command on the running state and hand both to `f`.
    pub fn then<T, F>(self, f: F) -> Queries<T, S>
    where
        T: Send + 'static,
        F: for<'s> FnOnce(&'s mut S, Command) -> BoxFuture<'s, DbResult<T>> + Send + 'static,
    {
        Queries::new(move |state: &mut S| match self.build(state) {
            Ok(command) => f(state, command),
            Err(error) => future::ready(Err(error)).boxed(),
        })
    }

    /// Execute the command; yields rows affected.
    pub fn execute(self) -> Queries<u64, S> {
        self.then(|state, command| async move { state.execute(&command).await }.boxed())
    }

    pub fn fetch_all(self) -> Queries<Vec<Row>, S> {
        self.then(|state, command| async move { state.fetch_all(&command).await }.boxed())
    }

    /// First row, if any.
    pub fn fetch_optional(self) -> Queries<Option<Row>, S> {
        self.then(|state, command| {
            async move {
                let rows = state.fetch_all(&command).await?;
                Ok(rows.into_iter().next())
            }
            .boxed()
        })
    }

    /// First column of the first row. NULL and an empty result both yield `None`.
    pub fn fetch_scalar(self) -> Queries<Option<JsonValue>, S> {
        self.then(|state, command| {
            async move {
                let rows = state.fetch_all(&command).await?;
                Ok(rows
                    .first()
                    .and_then(first_value)
                    .filter(|v| !v.is_null())
                    .cloned())
            }
            .boxed()
        })
    }
}
