//! Backend kinds.
//!
//! Every backend-specific decision in the crate is an exhaustive match over [`BackendKind`],
//! so adding a kind is a compile error everywhere a decision is missing.

use serde::{Deserialize, Serialize};

/// Supported backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Postgres,
    /// Includes MariaDB
    MySql,
    Sqlite,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::Postgres, Self::MySql, Self::Sqlite];

    /// Parse the backend kind from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySql)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else {
            None
        }
    }

    /// Get the display name for this backend.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::MySql => "MySQL",
            Self::Sqlite => "SQLite",
        }
    }

    /// Get the default port for this backend.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Postgres => Some(5432),
            Self::MySql => Some(3306),
            Self::Sqlite => None,
        }
    }

    /// URL scheme used when formatting connection strings.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Extension of externalized query files written for this backend.
    pub fn query_file_extension(&self) -> &'static str {
        match self {
            Self::Postgres => "pgsql",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Placeholder text for the parameter at `ordinal` (1-based).
    ///
    /// PostgreSQL numbers its parameters (`$1`), MySQL binds anonymously in order (`?`),
    /// SQLite uses numbered question marks (`?1`) so a parameter can be referenced twice.
    pub fn placeholder(&self, ordinal: usize) -> String {
        match self {
            Self::Postgres => format!("${ordinal}"),
            Self::MySql => "?".to_string(),
            Self::Sqlite => format!("?{ordinal}"),
        }
    }

    pub fn begin_statement(&self) -> &'static str {
        match self {
            Self::Postgres | Self::Sqlite => "BEGIN",
            Self::MySql => "START TRANSACTION",
        }
    }

    pub fn commit_statement(&self) -> &'static str {
        match self {
            Self::Postgres | Self::MySql | Self::Sqlite => "COMMIT",
        }
    }

    pub fn rollback_statement(&self) -> &'static str {
        match self {
            Self::Postgres | Self::MySql | Self::Sqlite => "ROLLBACK",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
