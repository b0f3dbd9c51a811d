//! CQL value conversion
//!
//! Each cache [`DataType`] binds as exactly one [`CqlValue`] variant. Reading
//! accepts any CQL type of the same family (`int` into a `BIGINT` column,
//! `ascii` into `VARCHAR`, `counter` into integers) and narrows with range
//! checks.

use chrono::{DateTime, Utc};
use remat_core::{BackendError, BindError, DataType, Value};
use scylla::value::{CqlTimestamp, CqlValue};

/// Build the bound value for `value` in a `data_type` slot. `None` is a CQL
/// null.
///
/// CQL timestamps carry milliseconds, so sub-millisecond keys do not bind.
pub fn to_cql(value: &Value, data_type: DataType) -> Result<Option<CqlValue>, BindError> {
    let cql = match (value, data_type) {
        (Value::Null, _) => return Ok(None),
        (Value::Boolean(v), DataType::Boolean) => CqlValue::Boolean(*v),
        (Value::TinyInt(v), DataType::TinyInt) => CqlValue::TinyInt(*v),
        (Value::SmallInt(v), DataType::SmallInt) => CqlValue::SmallInt(*v),
        (Value::Integer(v), DataType::Integer) => CqlValue::Int(*v),
        (Value::BigInt(v), DataType::BigInt) => CqlValue::BigInt(*v),
        (Value::Float(v), DataType::Float) => CqlValue::Double(*v),
        (Value::Varchar(v), DataType::Varchar) => CqlValue::Text(v.clone()),
        (Value::Varbinary(v), DataType::Varbinary) => CqlValue::Blob(v.clone()),
        (Value::Timestamp(v), DataType::Timestamp) => {
            let micros = v.timestamp_micros();
            if micros % 1_000 != 0 {
                return Err(BindError::OutOfRange {
                    data_type,
                    value: value.to_string(),
                });
            }
            CqlValue::Timestamp(CqlTimestamp(v.timestamp_millis()))
        }
        (Value::Uuid(v), DataType::Uuid) => CqlValue::Uuid(*v),
        _ => {
            return Err(BindError::TypeMismatch {
                data_type,
                value: value.to_string(),
            })
        }
    };
    Ok(Some(cql))
}

/// Read one CQL cell as `data_type`.
pub fn from_cql(cell: Option<CqlValue>, data_type: DataType) -> Result<Value, BackendError> {
    let Some(cell) = cell else {
        return Ok(Value::Null);
    };
    let mismatch = |cell: &CqlValue| {
        BackendError::other(format!(
            "cannot read CQL value {:?} as {}",
            cell, data_type
        ))
    };

    let value = match data_type {
        DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt => {
            let wide = match &cell {
                CqlValue::TinyInt(v) => i64::from(*v),
                CqlValue::SmallInt(v) => i64::from(*v),
                CqlValue::Int(v) => i64::from(*v),
                CqlValue::BigInt(v) => *v,
                CqlValue::Counter(c) => c.0,
                other => return Err(mismatch(other)),
            };
            Value::BigInt(wide).coerce_to(data_type)?
        }
        DataType::Float => match &cell {
            CqlValue::Double(v) => Value::Float(*v),
            CqlValue::Float(v) => Value::Float(f64::from(*v)),
            other => return Err(mismatch(other)),
        },
        DataType::Boolean => match cell {
            CqlValue::Boolean(v) => Value::Boolean(v),
            other => return Err(mismatch(&other)),
        },
        DataType::Varchar => match cell {
            CqlValue::Text(v) | CqlValue::Ascii(v) => Value::Varchar(v),
            other => return Err(mismatch(&other)),
        },
        DataType::Varbinary => match cell {
            CqlValue::Blob(v) => Value::Varbinary(v),
            other => return Err(mismatch(&other)),
        },
        DataType::Timestamp => match &cell {
            CqlValue::Timestamp(CqlTimestamp(millis)) => DateTime::<Utc>::from_timestamp_millis(*millis)
                .map(Value::Timestamp)
                .ok_or_else(|| mismatch(&cell))?,
            other => return Err(mismatch(other)),
        },
        DataType::Uuid => match cell {
            CqlValue::Uuid(v) => Value::Uuid(v),
            other => return Err(mismatch(&other)),
        },
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use remat_core::BackendErrorKind;
    use scylla::value::Counter;
    use uuid::Uuid;

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
            (
                Value::Timestamp(Utc.timestamp_millis_opt(1_700_000_000_123).unwrap()),
                DataType::Timestamp,
            ),
            (Value::Uuid(Uuid::nil()), DataType::Uuid),
        ];
        assert_eq!(samples.len(), DataType::ALL.len());

        for (value, data_type) in samples {
            let cql = to_cql(&value, data_type).unwrap();
            assert!(cql.is_some(), "{} bound as null", data_type);
            assert_eq!(from_cql(cql, data_type), Ok(value));
        }
    }

    #[test]
    fn test_null_binds_as_cql_null() {
        assert_eq!(to_cql(&Value::Null, DataType::Uuid), Ok(None));
        assert_eq!(from_cql(None, DataType::BigInt), Ok(Value::Null));
    }

    #[test]
    fn test_mismatch_rejected() {
        let err = to_cql(&Value::from("7"), DataType::BigInt).unwrap_err();
        assert!(matches!(
            err,
            BindError::TypeMismatch {
                data_type: DataType::BigInt,
                ..
            }
        ));
        assert!(to_cql(&Value::Integer(7), DataType::BigInt).is_err());
    }

    #[test]
    fn test_sub_millisecond_timestamp_rejected() {
        let ts = DateTime::<Utc>::from_timestamp_micros(1_700_000_000_000_001).unwrap();
        let err = to_cql(&Value::Timestamp(ts), DataType::Timestamp).unwrap_err();
        assert!(matches!(err, BindError::OutOfRange { .. }));
    }

    #[test]
    fn test_read_accepts_integer_family() {
        assert_eq!(
            from_cql(Some(CqlValue::Int(42)), DataType::BigInt),
            Ok(Value::BigInt(42))
        );
        assert_eq!(
            from_cql(Some(CqlValue::Counter(Counter(9))), DataType::Integer),
            Ok(Value::Integer(9))
        );
        assert_eq!(
            from_cql(Some(CqlValue::Ascii("a".to_string())), DataType::Varchar),
            Ok(Value::from("a"))
        );

        let err = from_cql(Some(CqlValue::BigInt(1 << 40)), DataType::Integer).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Other);
        let err = from_cql(Some(CqlValue::Text("x".to_string())), DataType::Uuid).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Other);
    }
}
