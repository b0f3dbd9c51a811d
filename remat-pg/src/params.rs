//! Typed query parameters
//!
//! Each cache [`DataType`] maps to exactly one PostgreSQL type and one Rust
//! representation. Values are coerced before they get here, so binding only
//! checks that the pair matches and picks the wire type.

use chrono::{DateTime, Utc};
use remat_core::{BindError, DataType, Value};
use tokio_postgres::types::{ToSql, Type};
use uuid::Uuid;

/// PostgreSQL type a column of `data_type` is bound and read as.
///
/// PostgreSQL has no one-byte integer, so `TINYINT` travels as `INT2`.
pub fn pg_type(data_type: DataType) -> Type {
    match data_type {
        DataType::Boolean => Type::BOOL,
        DataType::TinyInt | DataType::SmallInt => Type::INT2,
        DataType::Integer => Type::INT4,
        DataType::BigInt => Type::INT8,
        DataType::Float => Type::FLOAT8,
        DataType::Varchar => Type::VARCHAR,
        DataType::Varbinary => Type::BYTEA,
        DataType::Timestamp => Type::TIMESTAMPTZ,
        DataType::Uuid => Type::UUID,
    }
}

/// One bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum PgParam {
    Null(DataType),
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float8(f64),
    Text(String),
    Bytea(Vec<u8>),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
}

impl PgParam {
    /// Build the parameter for `value` in a `data_type` slot.
    pub fn from_value(value: &Value, data_type: DataType) -> Result<Self, BindError> {
        let param = match (value, data_type) {
            (Value::Null, _) => PgParam::Null(data_type),
            (Value::Boolean(v), DataType::Boolean) => PgParam::Bool(*v),
            (Value::TinyInt(v), DataType::TinyInt) => PgParam::Int2(i16::from(*v)),
            (Value::SmallInt(v), DataType::SmallInt) => PgParam::Int2(*v),
            (Value::Integer(v), DataType::Integer) => PgParam::Int4(*v),
            (Value::BigInt(v), DataType::BigInt) => PgParam::Int8(*v),
            (Value::Float(v), DataType::Float) => PgParam::Float8(*v),
            (Value::Varchar(v), DataType::Varchar) => PgParam::Text(v.clone()),
            (Value::Varbinary(v), DataType::Varbinary) => PgParam::Bytea(v.clone()),
            (Value::Timestamp(v), DataType::Timestamp) => PgParam::TimestampTz(*v),
            (Value::Uuid(v), DataType::Uuid) => PgParam::Uuid(*v),
            _ => {
                return Err(BindError::TypeMismatch {
                    data_type,
                    value: value.to_string(),
                })
            }
        };
        Ok(param)
    }

    pub fn pg_type(&self) -> Type {
        match self {
            PgParam::Null(data_type) => pg_type(*data_type),
            PgParam::Bool(_) => Type::BOOL,
            PgParam::Int2(_) => Type::INT2,
            PgParam::Int4(_) => Type::INT4,
            PgParam::Int8(_) => Type::INT8,
            PgParam::Float8(_) => Type::FLOAT8,
            PgParam::Text(_) => Type::VARCHAR,
            PgParam::Bytea(_) => Type::BYTEA,
            PgParam::TimestampTz(_) => Type::TIMESTAMPTZ,
            PgParam::Uuid(_) => Type::UUID,
        }
    }

    pub fn as_tosql(&self) -> &(dyn ToSql + Sync) {
        match self {
            PgParam::Null(data_type) => null_of(*data_type),
            PgParam::Bool(v) => v,
            PgParam::Int2(v) => v,
            PgParam::Int4(v) => v,
            PgParam::Int8(v) => v,
            PgParam::Float8(v) => v,
            PgParam::Text(v) => v,
            PgParam::Bytea(v) => v,
            PgParam::TimestampTz(v) => v,
            PgParam::Uuid(v) => v,
        }
    }
}

static NULL_BOOL: Option<bool> = None;
static NULL_INT2: Option<i16> = None;
static NULL_INT4: Option<i32> = None;
static NULL_INT8: Option<i64> = None;
static NULL_FLOAT8: Option<f64> = None;
static NULL_TEXT: Option<String> = None;
static NULL_BYTEA: Option<Vec<u8>> = None;
static NULL_TIMESTAMPTZ: Option<DateTime<Utc>> = None;
static NULL_UUID: Option<Uuid> = None;

fn null_of(data_type: DataType) -> &'static (dyn ToSql + Sync) {
    match data_type {
        DataType::Boolean => &NULL_BOOL,
        DataType::TinyInt | DataType::SmallInt => &NULL_INT2,
        DataType::Integer => &NULL_INT4,
        DataType::BigInt => &NULL_INT8,
        DataType::Float => &NULL_FLOAT8,
        DataType::Varchar => &NULL_TEXT,
        DataType::Varbinary => &NULL_BYTEA,
        DataType::Timestamp => &NULL_TIMESTAMPTZ,
        DataType::Uuid => &NULL_UUID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_binds_its_own_value() {
        let samples = [
            (Value::Boolean(true), DataType::Boolean),
            (Value::TinyInt(-3), DataType::TinyInt),
            (Value::SmallInt(300), DataType::SmallInt),
            (Value::Integer(70_000), DataType::Integer),
            (Value::BigInt(1 << 40), DataType::BigInt),
            (Value::Float(2.5), DataType::Float),
            (Value::from("acct"), DataType::Varchar),
            (Value::Varbinary(vec![1, 2]), DataType::Varbinary),
            (Value::Timestamp(Utc::now()), DataType::Timestamp),
            (Value::Uuid(Uuid::nil()), DataType::Uuid),
        ];
        assert_eq!(samples.len(), DataType::ALL.len());

        for (value, data_type) in samples {
            let param = PgParam::from_value(&value, data_type).unwrap();
            assert_eq!(param.pg_type(), pg_type(data_type));
        }
    }

    #[test]
    fn test_tinyint_widens() {
        assert_eq!(
            PgParam::from_value(&Value::TinyInt(-128), DataType::TinyInt),
            Ok(PgParam::Int2(-128))
        );
    }

    #[test]
    fn test_null_keeps_slot_type() {
        let param = PgParam::from_value(&Value::Null, DataType::Uuid).unwrap();
        assert_eq!(param, PgParam::Null(DataType::Uuid));
        assert_eq!(param.pg_type(), Type::UUID);
    }

    #[test]
    fn test_mismatch_rejected() {
        let err = PgParam::from_value(&Value::from("7"), DataType::BigInt).unwrap_err();
        assert!(matches!(
            err,
            BindError::TypeMismatch {
                data_type: DataType::BigInt,
                ..
            }
        ));
        assert!(PgParam::from_value(&Value::Integer(7), DataType::BigInt).is_err());
    }
}
