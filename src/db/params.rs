//! Parameter binding utilities.
//!
//! Each function binds a [`NativeParameter`] to a driver query, choosing the Rust type from
//! the parameter's native type so that an absent value becomes a NULL of the right type.

use crate::db::native::{MySqlType, NativeParameter, NativeType, PgType, SqliteType};
use crate::error::{DbError, DbResult};
use crate::models::{BackendKind, ParamValue};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};

fn mismatch(param: &NativeParameter, value: &ParamValue) -> DbError {
    DbError::invalid_input(format!(
        "Parameter '{}' declared as {} cannot bind a {} value",
        param.source_name(),
        param.native_type(),
        value.type_name()
    ))
}

fn wrong_backend(expected: BackendKind, param: &NativeParameter) -> DbError {
    DbError::unsupported_backend(expected, param.native_type().kind())
}

fn decimal_to_real(param: &NativeParameter, value: &Decimal) -> DbResult<f64> {
    value.to_f64().ok_or_else(|| {
        DbError::invalid_input(format!(
            "Parameter '{}' value {} cannot be stored as {}",
            param.source_name(),
            value,
            param.native_type()
        ))
    })
}

fn narrow_i16(param: &NativeParameter, value: i64) -> DbResult<i16> {
    i16::try_from(value).map_err(|_| {
        DbError::invalid_input(format!(
            "Parameter '{}' value {} does not fit in {}",
            param.source_name(),
            value,
            param.native_type()
        ))
    })
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &'q NativeParameter,
) -> DbResult<Query<'q, Postgres, PgArguments>> {
    let NativeType::Postgres(ty) = param.native_type() else {
        return Err(wrong_backend(BackendKind::Postgres, param));
    };
    Ok(match (ty, param.value()) {
        (PgType::Varchar | PgType::Text, None) => query.bind(None::<String>),
        (PgType::Varchar | PgType::Text, Some(ParamValue::Text(v))) => query.bind(v.as_str()),
        (PgType::Int2, None) => query.bind(None::<i16>),
        (PgType::Int2, Some(ParamValue::Int(v))) => query.bind(narrow_i16(param, *v)?),
        (PgType::Int8, None) => query.bind(None::<i64>),
        (PgType::Int8, Some(ParamValue::Int(v))) => query.bind(*v),
        (PgType::Bool, None) => query.bind(None::<bool>),
        (PgType::Bool, Some(ParamValue::Bool(v))) => query.bind(*v),
        (PgType::Timestamp, None) => query.bind(None::<NaiveDateTime>),
        (PgType::Timestamp, Some(ParamValue::DateTime(v))) => query.bind(*v),
        (PgType::Numeric, None) => query.bind(None::<Decimal>),
        (PgType::Numeric, Some(ParamValue::Decimal(v))) => query.bind(*v),
        (PgType::Bytea, None) => query.bind(None::<Vec<u8>>),
        (PgType::Bytea, Some(ParamValue::Bytes(v))) => query.bind(v.as_slice()),
        (_, Some(other)) => return Err(mismatch(param, other)),
    })
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    param: &'q NativeParameter,
) -> DbResult<Query<'q, MySql, MySqlArguments>> {
    let NativeType::MySql(ty) = param.native_type() else {
        return Err(wrong_backend(BackendKind::MySql, param));
    };
    Ok(match (ty, param.value()) {
        (MySqlType::VarChar | MySqlType::Text, None) => query.bind(None::<String>),
        (MySqlType::VarChar | MySqlType::Text, Some(ParamValue::Text(v))) => {
            query.bind(v.as_str())
        }
        (MySqlType::SmallInt, None) => query.bind(None::<i16>),
        (MySqlType::SmallInt, Some(ParamValue::Int(v))) => query.bind(narrow_i16(param, *v)?),
        (MySqlType::BigInt, None) => query.bind(None::<i64>),
        (MySqlType::BigInt, Some(ParamValue::Int(v))) => query.bind(*v),
        (MySqlType::TinyInt, None) => query.bind(None::<bool>),
        (MySqlType::TinyInt, Some(ParamValue::Bool(v))) => query.bind(*v),
        (MySqlType::DateTime, None) => query.bind(None::<NaiveDateTime>),
        (MySqlType::DateTime, Some(ParamValue::DateTime(v))) => query.bind(*v),
        (MySqlType::Decimal, None) => query.bind(None::<Decimal>),
        (MySqlType::Decimal, Some(ParamValue::Decimal(v))) => query.bind(*v),
        (MySqlType::VarBinary | MySqlType::Blob, None) => query.bind(None::<Vec<u8>>),
        (MySqlType::VarBinary | MySqlType::Blob, Some(ParamValue::Bytes(v))) => {
            query.bind(v.as_slice())
        }
        (_, Some(other)) => return Err(mismatch(param, other)),
    })
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q NativeParameter,
) -> DbResult<Query<'q, Sqlite, SqliteArguments<'q>>> {
    let NativeType::Sqlite(ty) = param.native_type() else {
        return Err(wrong_backend(BackendKind::Sqlite, param));
    };
    Ok(match (ty, param.value()) {
        (SqliteType::Text, None) => query.bind(None::<String>),
        (SqliteType::Text, Some(ParamValue::Text(v))) => query.bind(v.as_str()),
        // DateTime maps to TEXT; the driver stores it as ISO-8601 text
        (SqliteType::Text, Some(ParamValue::DateTime(v))) => query.bind(*v),
        (SqliteType::Integer, None) => query.bind(None::<i64>),
        (SqliteType::Integer, Some(ParamValue::Int(v))) => query.bind(*v),
        (SqliteType::Integer, Some(ParamValue::Bool(v))) => query.bind(*v),
        (SqliteType::Real, None) => query.bind(None::<f64>),
        (SqliteType::Real, Some(ParamValue::Decimal(v))) => {
            query.bind(decimal_to_real(param, v)?)
        }
        (SqliteType::Blob, None) => query.bind(None::<Vec<u8>>),
        (SqliteType::Blob, Some(ParamValue::Bytes(v))) => query.bind(v.as_slice()),
        (_, Some(other)) => return Err(mismatch(param, other)),
    })
}
