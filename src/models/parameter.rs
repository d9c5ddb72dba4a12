//! Backend-agnostic parameter descriptors.
//!
//! A [`DbParameter`] names a value and its logical type. It is mapped to a native
//! parameter only when a command is built for a concrete backend.

use crate::error::{DbError, DbResult};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Logical parameter types, independent of any backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    NVarChar,
    SmallInt,
    BigInt,
    Boolean,
    DateTime,
    Decimal,
    Text,
    VarBinary,
    Blob,
}

impl LogicalType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NVarChar => "nvarchar",
            Self::SmallInt => "smallint",
            Self::BigInt => "bigint",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Decimal => "decimal",
            Self::Text => "text",
            Self::VarBinary => "varbinary",
            Self::Blob => "blob",
        }
    }

    /// Check whether a value has the shape this logical type carries.
    pub fn accepts(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (Self::NVarChar | Self::Text, ParamValue::Text(_)) => true,
            (Self::SmallInt, ParamValue::Int(v)) => i16::try_from(*v).is_ok(),
            (Self::BigInt, ParamValue::Int(_)) => true,
            (Self::Boolean, ParamValue::Bool(_)) => true,
            (Self::DateTime, ParamValue::DateTime(_)) => true,
            (Self::Decimal, ParamValue::Decimal(_)) => true,
            (Self::VarBinary | Self::Blob, ParamValue::Bytes(_)) => true,
            _ => false,
        }
    }

    /// Convert a JSON cell into a value of this logical type.
    ///
    /// JSON `null` becomes `None`. Binary types expect base64 text, the same encoding
    /// rows use for binary columns.
    pub fn value_from_json(&self, value: &JsonValue) -> DbResult<Option<ParamValue>> {
        if value.is_null() {
            return Ok(None);
        }
        let converted = match self {
            Self::NVarChar | Self::Text => match value {
                JsonValue::String(s) => Some(ParamValue::Text(s.clone())),
                other => Some(ParamValue::Text(other.to_string())),
            },
            Self::SmallInt | Self::BigInt => match value {
                JsonValue::Number(n) => n.as_i64().map(ParamValue::Int),
                JsonValue::String(s) => s.trim().parse().ok().map(ParamValue::Int),
                JsonValue::Bool(b) => Some(ParamValue::Int(i64::from(*b))),
                _ => None,
            },
            Self::Boolean => match value {
                JsonValue::Bool(b) => Some(ParamValue::Bool(*b)),
                JsonValue::Number(n) => n.as_i64().map(|v| ParamValue::Bool(v != 0)),
                JsonValue::String(s) => s.trim().parse().ok().map(ParamValue::Bool),
                _ => None,
            },
            Self::DateTime => match value {
                JsonValue::String(s) => parse_date_time(s).map(ParamValue::DateTime),
                _ => None,
            },
            Self::Decimal => match value {
                JsonValue::Number(n) => parse_decimal(&n.to_string()).map(ParamValue::Decimal),
                JsonValue::String(s) => parse_decimal(s).map(ParamValue::Decimal),
                _ => None,
            },
            Self::VarBinary | Self::Blob => match value {
                JsonValue::String(s) => STANDARD.decode(s).ok().map(ParamValue::Bytes),
                _ => None,
            },
        };

        match converted {
            Some(v) if self.accepts(&v) => Ok(Some(v)),
            _ => Err(DbError::invalid_input(format!(
                "Cannot convert {} to {}",
                value,
                self.name()
            ))),
        }
    }
}

impl std::fmt::Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse the date-time text formats the drivers produce.
pub fn parse_date_time(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
    let s = s.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

/// Parse decimal text exactly, accepting scientific notation.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    s.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(s).ok())
}

/// A parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    /// Integers are carried as i64 and narrowed when bound
    Int(i64),
    Bool(bool),
    DateTime(NaiveDateTime),
    /// Exact; SQLite binds it as REAL
    Decimal(Decimal),
    Bytes(Vec<u8>),
}

impl ParamValue {
    /// Get the type name of this value for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::DateTime(_) => "datetime",
            Self::Decimal(_) => "decimal",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Truncate text or binary values to `size`, the way drivers treat a declared size.
    pub(crate) fn truncated(self, size: usize) -> Self {
        match self {
            Self::Text(s) if s.chars().count() > size => {
                Self::Text(s.chars().take(size).collect())
            }
            Self::Bytes(mut b) if b.len() > size => {
                b.truncate(size);
                Self::Bytes(b)
            }
            other => other,
        }
    }
}

/// A named, typed, possibly-null parameter. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct DbParameter {
    name: String,
    logical_type: LogicalType,
    value: Option<ParamValue>,
    size: Option<u32>,
}

impl DbParameter {
    /// Create a parameter, rejecting a value whose shape does not fit the logical type.
    pub fn new(
        name: impl Into<String>,
        logical_type: LogicalType,
        value: Option<ParamValue>,
    ) -> DbResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(DbError::invalid_input("Parameter name cannot be empty"));
        }
        if let Some(v) = &value {
            if !logical_type.accepts(v) {
                return Err(DbError::invalid_input(format!(
                    "Parameter '{}' of type {} cannot hold a {} value",
                    name,
                    logical_type,
                    v.type_name()
                )));
            }
        }
        Ok(Self {
            name,
            logical_type,
            value,
            size: None,
        })
    }

    fn typed(name: impl Into<String>, logical_type: LogicalType, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            logical_type,
            value: Some(value),
            size: None,
        }
    }

    /// A typed NULL.
    pub fn null(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            value: None,
            size: None,
        }
    }

    pub fn nvarchar(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::typed(name, LogicalType::NVarChar, ParamValue::Text(value.into()))
    }

    pub fn small_int(name: impl Into<String>, value: i16) -> Self {
        Self::typed(name, LogicalType::SmallInt, ParamValue::Int(value.into()))
    }

    pub fn big_int(name: impl Into<String>, value: i64) -> Self {
        Self::typed(name, LogicalType::BigInt, ParamValue::Int(value))
    }

    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self::typed(name, LogicalType::Boolean, ParamValue::Bool(value))
    }

    pub fn date_time(name: impl Into<String>, value: NaiveDateTime) -> Self {
        Self::typed(name, LogicalType::DateTime, ParamValue::DateTime(value))
    }

    pub fn decimal(name: impl Into<String>, value: Decimal) -> Self {
        Self::typed(name, LogicalType::Decimal, ParamValue::Decimal(value))
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::typed(name, LogicalType::Text, ParamValue::Text(value.into()))
    }

    pub fn var_binary(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::typed(name, LogicalType::VarBinary, ParamValue::Bytes(value.into()))
    }

    pub fn blob(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::typed(name, LogicalType::Blob, ParamValue::Bytes(value.into()))
    }

    /// Declare a maximum size for text and binary values.
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn logical_type(&self) -> LogicalType {
        self.logical_type
    }

    pub fn value(&self) -> Option<&ParamValue> {
        self.value.as_ref()
    }

    pub fn size(&self) -> Option<u32> {
        self.size
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}
