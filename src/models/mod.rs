//! Data models shared by every backend.

pub mod backend;
pub mod parameter;

pub use backend::BackendKind;
pub use parameter::{DbParameter, LogicalType, ParamValue, parse_date_time, parse_decimal};
