//! Logical → native parameter type mapping.
//!
//! | Logical   | PostgreSQL | MySQL      | SQLite  |
//! |-----------|------------|------------|---------|
//! | NVarChar  | VARCHAR    | VARCHAR    | TEXT    |
//! | SmallInt  | INT2       | SMALLINT   | INTEGER |
//! | BigInt    | INT8       | BIGINT     | INTEGER |
//! | Boolean   | BOOL       | TINYINT(1) | INTEGER |
//! | DateTime  | TIMESTAMP  | DATETIME   | TEXT    |
//! | Decimal   | NUMERIC    | DECIMAL    | REAL    |
//! | Text      | TEXT       | TEXT       | TEXT    |
//! | VarBinary | BYTEA      | VARBINARY  | BLOB    |
//! | Blob      | BYTEA      | BLOB       | BLOB    |

use crate::models::{BackendKind, DbParameter, LogicalType, ParamValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgType {
    Varchar,
    Int2,
    Int8,
    Bool,
    Timestamp,
    Numeric,
    Text,
    Bytea,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MySqlType {
    VarChar,
    SmallInt,
    BigInt,
    /// TINYINT(1)
    TinyInt,
    DateTime,
    Decimal,
    Text,
    VarBinary,
    Blob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqliteType {
    Text,
    Integer,
    Real,
    Blob,
}

/// A backend-specific parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    Postgres(PgType),
    MySql(MySqlType),
    Sqlite(SqliteType),
}

impl NativeType {
    pub fn for_logical(kind: BackendKind, logical: LogicalType) -> Self {
        use LogicalType as L;
        match kind {
            BackendKind::Postgres => Self::Postgres(match logical {
                L::NVarChar => PgType::Varchar,
                L::SmallInt => PgType::Int2,
                L::BigInt => PgType::Int8,
                L::Boolean => PgType::Bool,
                L::DateTime => PgType::Timestamp,
                L::Decimal => PgType::Numeric,
                L::Text => PgType::Text,
                L::VarBinary | L::Blob => PgType::Bytea,
            }),
            BackendKind::MySql => Self::MySql(match logical {
                L::NVarChar => MySqlType::VarChar,
                L::SmallInt => MySqlType::SmallInt,
                L::BigInt => MySqlType::BigInt,
                L::Boolean => MySqlType::TinyInt,
                L::DateTime => MySqlType::DateTime,
                L::Decimal => MySqlType::Decimal,
                L::Text => MySqlType::Text,
                L::VarBinary => MySqlType::VarBinary,
                L::Blob => MySqlType::Blob,
            }),
            BackendKind::Sqlite => Self::Sqlite(match logical {
                L::NVarChar | L::DateTime | L::Text => SqliteType::Text,
                L::SmallInt | L::BigInt | L::Boolean => SqliteType::Integer,
                L::Decimal => SqliteType::Real,
                L::VarBinary | L::Blob => SqliteType::Blob,
            }),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Postgres(_) => BackendKind::Postgres,
            Self::MySql(_) => BackendKind::MySql,
            Self::Sqlite(_) => BackendKind::Sqlite,
        }
    }

    /// SQL name of the native type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres(t) => match t {
                PgType::Varchar => "VARCHAR",
                PgType::Int2 => "INT2",
                PgType::Int8 => "INT8",
                PgType::Bool => "BOOL",
                PgType::Timestamp => "TIMESTAMP",
                PgType::Numeric => "NUMERIC",
                PgType::Text => "TEXT",
                PgType::Bytea => "BYTEA",
            },
            Self::MySql(t) => match t {
                MySqlType::VarChar => "VARCHAR",
                MySqlType::SmallInt => "SMALLINT",
                MySqlType::BigInt => "BIGINT",
                MySqlType::TinyInt => "TINYINT(1)",
                MySqlType::DateTime => "DATETIME",
                MySqlType::Decimal => "DECIMAL",
                MySqlType::Text => "TEXT",
                MySqlType::VarBinary => "VARBINARY",
                MySqlType::Blob => "BLOB",
            },
            Self::Sqlite(t) => match t {
                SqliteType::Text => "TEXT",
                SqliteType::Integer => "INTEGER",
                SqliteType::Real => "REAL",
                SqliteType::Blob => "BLOB",
            },
        }
    }
}

impl std::fmt::Display for NativeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A parameter ready to be bound by one backend's driver.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeParameter {
    /// Placeholder as it appears in SQL for this backend
    placeholder: String,
    /// Name of the descriptor this parameter was built from
    source_name: String,
    logical_type: LogicalType,
    native_type: NativeType,
    value: Option<ParamValue>,
    size: Option<u32>,
}

impl NativeParameter {
    /// Map a descriptor to `kind`'s native type at the given 1-based position.
    pub fn from_descriptor(kind: BackendKind, ordinal: usize, parameter: &DbParameter) -> Self {
        let size = parameter.size();
        let value = parameter.value().cloned().map(|v| match size {
            Some(size) => v.truncated(size as usize),
            None => v,
        });
        Self {
            placeholder: kind.placeholder(ordinal),
            source_name: parameter.name().to_string(),
            logical_type: parameter.logical_type(),
            native_type: NativeType::for_logical(kind, parameter.logical_type()),
            value,
            size,
        }
    }

    /// Replace the value, keeping the declared type and size.
    pub(crate) fn rebind(&mut self, value: Option<ParamValue>) {
        self.value = match (value, self.size) {
            (Some(v), Some(size)) => Some(v.truncated(size as usize)),
            (v, _) => v,
        };
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn logical_type(&self) -> LogicalType {
        self.logical_type
    }

    pub fn native_type(&self) -> NativeType {
        self.native_type
    }

    pub fn value(&self) -> Option<&ParamValue> {
        self.value.as_ref()
    }

    pub fn size(&self) -> Option<u32> {
        self.size
    }
}
