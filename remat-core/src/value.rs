//! Column data types and cache cell values
//!
//! Every cache column carries an explicit [`DataType`] tag. Primary-key
//! arguments arrive as loosely typed [`Value`]s from the cache layer and are
//! converted with [`Value::coerce_to`] before an adapter binds them, so an
//! `INTEGER` column is always bound as an integer and never as text.

use crate::error::BindError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Declared type of a cache column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    /// 64-bit floating point
    Float,
    Varchar,
    Varbinary,
    /// Microsecond precision, UTC
    Timestamp,
    Uuid,
}

impl DataType {
    /// All data types, in declaration order.
    pub const ALL: [DataType; 10] = [
        DataType::Boolean,
        DataType::TinyInt,
        DataType::SmallInt,
        DataType::Integer,
        DataType::BigInt,
        DataType::Float,
        DataType::Varchar,
        DataType::Varbinary,
        DataType::Timestamp,
        DataType::Uuid,
    ];

    pub fn as_sql_str(&self) -> &'static str {
        match self {
            DataType::Boolean => "BOOLEAN",
            DataType::TinyInt => "TINYINT",
            DataType::SmallInt => "SMALLINT",
            DataType::Integer => "INTEGER",
            DataType::BigInt => "BIGINT",
            DataType::Float => "FLOAT",
            DataType::Varchar => "VARCHAR",
            DataType::Varbinary => "VARBINARY",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Uuid => "UUID",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql_str())
    }
}

impl FromStr for DataType {
    type Err = DataTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(DataType::Boolean),
            "tinyint" | "int1" => Ok(DataType::TinyInt),
            "smallint" | "int2" => Ok(DataType::SmallInt),
            "integer" | "int" | "int4" => Ok(DataType::Integer),
            "bigint" | "int8" | "counter" => Ok(DataType::BigInt),
            "float" | "double" | "float8" | "double precision" => Ok(DataType::Float),
            "varchar" | "text" | "string" | "ascii" => Ok(DataType::Varchar),
            "varbinary" | "bytea" | "blob" => Ok(DataType::Varbinary),
            "timestamp" | "timestamptz" => Ok(DataType::Timestamp),
            "uuid" | "timeuuid" => Ok(DataType::Uuid),
            other => Err(DataTypeParseError(other.to_string())),
        }
    }
}

/// Error when parsing an unknown data type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTypeParseError(pub String);

impl fmt::Display for DataTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid data type: {}", self.0)
    }
}

impl std::error::Error for DataTypeParseError {}

/// One cell of a cache row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Float(f64),
    Varchar(String),
    Varbinary(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl Value {
    /// The data type this value carries, `None` for `Null`.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::TinyInt(_) => Some(DataType::TinyInt),
            Value::SmallInt(_) => Some(DataType::SmallInt),
            Value::Integer(_) => Some(DataType::Integer),
            Value::BigInt(_) => Some(DataType::BigInt),
            Value::Float(_) => Some(DataType::Float),
            Value::Varchar(_) => Some(DataType::Varchar),
            Value::Varbinary(_) => Some(DataType::Varbinary),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Uuid(_) => Some(DataType::Uuid),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(i64::from(*v)),
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Integer(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert this value into the representation of `data_type`.
    ///
    /// Integer widths convert with range checking, integers widen to
    /// `Float`, `Varchar` parses into numeric, boolean, uuid and RFC 3339
    /// timestamp columns, and `BigInt` microseconds since the epoch become a
    /// `Timestamp`. `Null` stays `Null` for every type.
    pub fn coerce_to(&self, data_type: DataType) -> Result<Value, BindError> {
        if self.is_null() || self.data_type() == Some(data_type) {
            return Ok(self.clone());
        }

        let mismatch = || BindError::TypeMismatch {
            data_type,
            value: self.to_string(),
        };
        let out_of_range = || BindError::OutOfRange {
            data_type,
            value: self.to_string(),
        };

        match data_type {
            DataType::Boolean => match self {
                Value::Varchar(s) => s
                    .trim()
                    .to_ascii_lowercase()
                    .parse::<bool>()
                    .map(Value::Boolean)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt => {
                let wide = match self {
                    Value::Varchar(s) => s.trim().parse::<i64>().map_err(|_| mismatch())?,
                    other => other.as_i64().ok_or_else(mismatch)?,
                };
                narrow_integer(wide, data_type).ok_or_else(out_of_range)
            }
            DataType::Float => match self {
                Value::Varchar(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| mismatch()),
                other => {
                    let v = other.as_i64().ok_or_else(mismatch)?;
                    let widened = v as f64;
                    // Above 2^53 not every integer has an exact double.
                    if widened as i64 != v || widened >= i64::MAX as f64 {
                        return Err(out_of_range());
                    }
                    Ok(Value::Float(widened))
                }
            },
            DataType::Varchar | DataType::Varbinary => Err(mismatch()),
            DataType::Timestamp => match self {
                Value::BigInt(micros) => DateTime::<Utc>::from_timestamp_micros(*micros)
                    .map(Value::Timestamp)
                    .ok_or_else(out_of_range),
                Value::Varchar(s) => DateTime::parse_from_rfc3339(s.trim())
                    .map(|ts| Value::Timestamp(ts.with_timezone(&Utc)))
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            DataType::Uuid => match self {
                Value::Varchar(s) => Uuid::parse_str(s.trim())
                    .map(Value::Uuid)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
        }
    }
}

fn narrow_integer(value: i64, data_type: DataType) -> Option<Value> {
    match data_type {
        DataType::TinyInt => i8::try_from(value).ok().map(Value::TinyInt),
        DataType::SmallInt => i16::try_from(value).ok().map(Value::SmallInt),
        DataType::Integer => i32::try_from(value).ok().map(Value::Integer),
        DataType::BigInt => Some(Value::BigInt(value)),
        _ => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Varchar(v) => write!(f, "'{}'", v),
            Value::Varbinary(v) => write!(f, "<{} bytes>", v.len()),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Uuid(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::TinyInt(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Varchar(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Varchar(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Varbinary(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
