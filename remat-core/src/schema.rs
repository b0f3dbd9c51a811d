//! Cache table schema metadata
//!
//! [`SchemaMetadata`] is the immutable description of one cache table: its
//! columns in cache order, their declared types, and the ordered subset of
//! columns forming the primary key. It is validated once, at configure time,
//! and everything downstream (query synthesis, binding, row mapping) reads
//! column order from it.

use crate::error::{ConfigError, RematResult};
use crate::DataType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One column of a cache table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// 1-based position in cache column order.
    pub ordinal_position: usize,
    pub data_type: DataType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, ordinal_position: usize, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            ordinal_position,
            data_type,
        }
    }
}

/// Validated description of a cache table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    schema_name: String,
    table_name: String,
    columns: Vec<ColumnDescriptor>,
    /// Indices into `columns`, in primary-key order.
    primary_key: Vec<usize>,
}

impl SchemaMetadata {
    /// Build and validate schema metadata.
    ///
    /// `primary_key` names the key columns in key order, which need not match
    /// cache column order.
    pub fn new<S: AsRef<str>>(
        schema_name: impl Into<String>,
        table_name: impl Into<String>,
        columns: Vec<ColumnDescriptor>,
        primary_key: &[S],
    ) -> RematResult<Self> {
        let schema_name = schema_name.into();
        let table_name = table_name.into();
        let qualified = format!("{}.{}", schema_name, table_name);
        let invalid = |reason: String| ConfigError::InvalidSchema {
            table: qualified.clone(),
            reason,
        };

        if schema_name.trim().is_empty() {
            return Err(invalid("schema name is empty".to_string()).into());
        }
        if table_name.trim().is_empty() {
            return Err(invalid("table name is empty".to_string()).into());
        }
        if columns.is_empty() {
            return Err(invalid("table has no columns".to_string()).into());
        }

        let mut seen = HashSet::new();
        for (index, column) in columns.iter().enumerate() {
            if column.name.trim().is_empty() {
                return Err(invalid(format!("column {} has an empty name", index + 1)).into());
            }
            if !seen.insert(column.name.as_str()) {
                return Err(invalid(format!("duplicate column {}", column.name)).into());
            }
            if column.ordinal_position != index + 1 {
                return Err(invalid(format!(
                    "column {} has ordinal position {}, expected {}",
                    column.name,
                    column.ordinal_position,
                    index + 1
                ))
                .into());
            }
        }

        if primary_key.is_empty() {
            return Err(invalid("primary key is empty".to_string()).into());
        }

        let mut key = Vec::with_capacity(primary_key.len());
        for name in primary_key {
            let name = name.as_ref();
            let index = columns
                .iter()
                .position(|c| c.name == name)
                .ok_or_else(|| invalid(format!("primary key column {} is not a column", name)))?;
            if key.contains(&index) {
                return Err(invalid(format!("primary key column {} repeated", name)).into());
            }
            key.push(index);
        }

        Ok(Self {
            schema_name,
            table_name,
            columns,
            primary_key: key,
        })
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// `schema.table`, used in logs and errors.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.table_name)
    }

    /// Columns in cache column order.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_data_type(&self, name: &str) -> Option<DataType> {
        self.column(name).map(|c| c.data_type)
    }

    /// Primary-key columns in key order.
    pub fn pk_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> + '_ {
        self.primary_key.iter().map(move |&i| &self.columns[i])
    }

    /// The `index`-th primary-key column (0-based, key order).
    pub fn pk_column(&self, index: usize) -> Option<&ColumnDescriptor> {
        self.primary_key.get(index).map(|&i| &self.columns[i])
    }

    pub fn pk_count(&self) -> usize {
        self.primary_key.len()
    }
}
