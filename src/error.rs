//! Error types for query execution.
//!
//! Driver failures, resource lookups and programming-invariant violations all surface as
//! [`DbError`]. Application failures that should only influence the transaction outcome
//! are not errors here: they travel as the `Err` arm of a `Result` value inside the
//! computation.

use crate::models::BackendKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Transaction error: {message} (transaction: {transaction_id})")]
    Transaction {
        message: String,
        transaction_id: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Unsupported backend: expected {expected}, found {found}")]
    UnsupportedBackend {
        expected: BackendKind,
        found: BackendKind,
    },

    #[error("Query resource '{file}' not found among {available} resources")]
    QueryResourceNotFound { file: String, available: usize },

    #[error("Query resource '{file}' is ambiguous: {}", candidates.join(", "))]
    AmbiguousQueryResource {
        file: String,
        candidates: Vec<String>,
    },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    pub fn transaction(message: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            transaction_id: transaction_id.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// A command or parameter built for one backend reached another.
    pub fn unsupported_backend(expected: BackendKind, found: BackendKind) -> Self {
        Self::UnsupportedBackend { expected, found }
    }

    pub fn query_resource_not_found(file: impl Into<String>, available: usize) -> Self {
        Self::QueryResourceNotFound {
            file: file.into(),
            available,
        }
    }

    pub fn ambiguous_query_resource(file: impl Into<String>, candidates: Vec<String>) -> Self {
        Self::AmbiguousQueryResource {
            file: file.into(),
            candidates,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Programming-invariant violations: these indicate a bug in the caller, not a
    /// condition to recover from.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedBackend { .. } | Self::InvalidInput { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => DbError::schema(
                format!("Type not found: {}", type_name),
                type_name.to_string(),
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::schema(format!("Column not found: {}", col), col.to_string())
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(DbError::internal("x").suggestion(), None);
    }

    #[test]
    fn test_unsupported_backend_is_invariant_violation() {
        let err = DbError::unsupported_backend(BackendKind::Postgres, BackendKind::Sqlite);
        assert!(err.is_invariant_violation());
        assert_eq!(
            err.to_string(),
            "Unsupported backend: expected PostgreSQL, found SQLite"
        );
        assert!(!DbError::timeout("query", 30).is_invariant_violation());
    }

    #[test]
    fn test_ambiguous_resource_lists_candidates() {
        let err = DbError::ambiguous_query_resource(
            "users.sqlite",
            vec!["a/users.sqlite".to_string(), "b/users.sqlite".to_string()],
        );
        let msg = err.to_string();
        assert!(msg.contains("a/users.sqlite, b/users.sqlite"));
    }

    #[test]
    fn test_resource_not_found_display() {
        let err = DbError::query_resource_not_found("missing.pgsql", 4);
        assert_eq!(
            err.to_string(),
            "Query resource 'missing.pgsql' not found among 4 resources"
        );
    }
}
