//! Database layer.
//!
//! This module provides everything a query computation runs against:
//! - Backend drivers over sqlx connections
//! - Native parameter mapping and binding
//! - Commands and the contexts that execute them
//! - Transactions tied to one connection
//! - Query files resolved per backend
//! - Row decoding to JSON

pub mod backend;
pub mod command;
pub mod context;
pub mod native;
pub(crate) mod params;
pub mod resources;
pub mod state;
pub mod types;

pub use backend::{Backend, MySqlBackend, PgBackend, SqliteBackend};
pub use command::{Command, build_command};
pub use context::{ConnectionContext, Session, Transaction, TransactionState, set_transaction};
pub use native::{NativeParameter, NativeType};
pub use resources::{EmbeddedQueries, MemoryQueries, QueryLocator, QueryStore, resolve_query};
pub use state::{Connect, QueryState};
pub use types::{Row, RowToJson};
