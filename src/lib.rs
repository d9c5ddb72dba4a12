//! DB Queries Library
//!
//! Database operations as composable values. A [`Queries`] computation is built from
//! [`CommandFactory`] values, composed with `map`/`and_then`, and run against PostgreSQL,
//! MySQL or SQLite through a [`ConnectionSource`], optionally inside a transaction whose
//! outcome follows the computation's result.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod queries;
pub mod tabular;

#[cfg(test)]
mod test_utils;

pub use config::{ConnectOptions, ConnectionAuth, ConnectionData, ConnectionSource};
pub use db::{
    ConnectionContext, MySqlBackend, PgBackend, QueryLocator, SqliteBackend, set_transaction,
};
pub use error::{DbError, DbResult};
pub use models::{BackendKind, DbParameter, LogicalType, ParamValue};
pub use queries::{CommandFactory, OneOf2, OneOf3, Queries};
pub use tabular::{Table, TableCommand};
