//! Select statement synthesis
//!
//! The projection and predicate rules are shared by every backend: project
//! all cache columns in cache order, constrain on the primary-key columns in
//! key order. A [`Dialect`] only decides how identifiers are quoted and how
//! placeholders are spelled.

use crate::SchemaMetadata;
use serde::{Deserialize, Serialize};

/// Identifier quoting and placeholder style of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// `"ident"` and `$1, $2, ...`
    Postgres,
    /// bare identifiers and `?`
    Cql,
    /// `"ident"` and `?`
    Ansi,
}

impl Dialect {
    pub fn quote_identifier(&self, ident: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Ansi => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::Cql => ident.to_string(),
        }
    }

    /// Placeholder for the 0-based bind `slot`.
    pub fn placeholder(&self, slot: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", slot + 1),
            Dialect::Cql | Dialect::Ansi => "?".to_string(),
        }
    }
}

/// Build the primary-key select for `schema` in `dialect`.
///
/// The output is a pure function of its inputs, so callers may cache it and
/// tests may assert on it verbatim.
pub fn select_by_primary_key(schema: &SchemaMetadata, dialect: Dialect) -> String {
    let projection = schema
        .columns()
        .iter()
        .map(|c| dialect.quote_identifier(&c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let predicate = schema
        .pk_columns()
        .enumerate()
        .map(|(slot, c)| {
            format!(
                "{} = {}",
                dialect.quote_identifier(&c.name),
                dialect.placeholder(slot)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ");

    format!(
        "SELECT {} FROM {}.{} WHERE {}",
        projection,
        dialect.quote_identifier(schema.schema_name()),
        dialect.quote_identifier(schema.table_name()),
        predicate
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColumnDescriptor, DataType};

    fn accounts(pk: &[&str]) -> SchemaMetadata {
        SchemaMetadata::new(
            "bank",
            "accounts",
            vec![
                ColumnDescriptor::new("id", 1, DataType::BigInt),
                ColumnDescriptor::new("name", 2, DataType::Varchar),
                ColumnDescriptor::new("balance", 3, DataType::BigInt),
            ],
            pk,
        )
        .unwrap()
    }

    #[test]
    fn test_postgres_select() {
        assert_eq!(
            select_by_primary_key(&accounts(&["id"]), Dialect::Postgres),
            r#"SELECT "id", "name", "balance" FROM "bank"."accounts" WHERE "id" = $1"#
        );
    }

    #[test]
    fn test_cql_select_uses_pk_order() {
        assert_eq!(
            select_by_primary_key(&accounts(&["name", "id"]), Dialect::Cql),
            "SELECT id, name, balance FROM bank.accounts WHERE name = ? AND id = ?"
        );
    }

    #[test]
    fn test_ansi_select() {
        assert_eq!(
            select_by_primary_key(&accounts(&["balance", "id"]), Dialect::Ansi),
            r#"SELECT "id", "name", "balance" FROM "bank"."accounts" WHERE "balance" = ? AND "id" = ?"#
        );
    }

    #[test]
    fn test_quote_escaping() {
        assert_eq!(Dialect::Postgres.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let schema = accounts(&["id"]);
        let first = select_by_primary_key(&schema, Dialect::Postgres);
        for _ in 0..10 {
            assert_eq!(select_by_primary_key(&schema, Dialect::Postgres), first);
        }
    }
}
