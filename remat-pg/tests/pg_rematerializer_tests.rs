#![cfg(feature = "db-tests")]

//! Rematerializer against a live PostgreSQL.

mod support;

use std::sync::Arc;
use std::time::Duration;

use remat_core::{ColumnDescriptor, DataType, HealthState, RematError, Value};
use remat_pg::configure;
use remat_storage::NoopStats;
use remat_test_utils::fixtures::account_row;
use remat_test_utils::RecordingStats;
use support::db::{execute_batch, test_config};

fn account_columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new("id", 1, DataType::BigInt),
        ColumnDescriptor::new("name", 2, DataType::Varchar),
        ColumnDescriptor::new("balance", 3, DataType::BigInt),
    ]
}

async fn seed_accounts(schema: &str) {
    let sql = format!(
        r#"
        CREATE SCHEMA IF NOT EXISTS {schema};
        DROP TABLE IF EXISTS {schema}.accounts;
        CREATE TABLE {schema}.accounts (
            balance BIGINT NOT NULL,
            name TEXT NOT NULL,
            id BIGINT PRIMARY KEY
        );
        INSERT INTO {schema}.accounts (id, name, balance) VALUES (7, 'A', 42), (8, 'B', -3);
        "#
    );
    execute_batch(&test_config(), &sql).await;
}

#[tokio::test]
async fn test_fetch_found_and_missing() {
    seed_accounts("remat_found").await;
    let stats = Arc::new(RecordingStats::new());
    let remat = configure(
        "remat_found",
        "accounts",
        account_columns(),
        &["id"],
        &test_config(),
        stats.clone(),
    )
    .await
    .unwrap();
    assert_eq!(remat.health().await, HealthState::Connected);

    let row = remat.fetch(&[Value::BigInt(7)], 1).await.unwrap();
    assert_eq!(row, Some(account_row(7, "A", 42)));

    let row = remat.fetch(&[Value::from("8")], 1).await.unwrap();
    assert_eq!(row, Some(account_row(8, "B", -3)));

    let row = remat.fetch(&[Value::BigInt(9)], 1).await.unwrap();
    assert_eq!(row, None);
    assert_eq!(remat.health().await, HealthState::Connected);
    assert_eq!(stats.count("postgres_query_ms"), 3);
}

#[tokio::test]
async fn test_missing_table_fails_closed() {
    execute_batch(&test_config(), "DROP TABLE IF EXISTS public.remat_absent").await;
    let remat = configure(
        "public",
        "remat_absent",
        account_columns(),
        &["id"],
        &test_config(),
        Arc::new(NoopStats),
    )
    .await
    .unwrap();

    let result = remat.fetch(&[Value::BigInt(7)], 1).await;
    assert!(matches!(result, Err(RematError::UnclassifiedFetch { .. })));
    assert_eq!(remat.health().await, HealthState::Broken);

    assert_eq!(remat.reconnect().await, HealthState::Connected);
}

#[tokio::test]
async fn test_disconnect_then_reconnect() {
    seed_accounts("remat_lifecycle").await;
    let remat = configure(
        "remat_lifecycle",
        "accounts",
        account_columns(),
        &["id"],
        &test_config(),
        Arc::new(NoopStats),
    )
    .await
    .unwrap();

    remat.disconnect().await;
    remat.disconnect().await;
    assert!(matches!(
        remat.fetch(&[Value::BigInt(7)], 1).await,
        Err(RematError::NotConnected { .. })
    ));

    assert_eq!(remat.reconnect().await, HealthState::Connected);
    let row = remat.fetch(&[Value::BigInt(7)], 1).await.unwrap();
    assert_eq!(row, Some(account_row(7, "A", 42)));
}

#[tokio::test]
async fn test_timed_out_query_does_not_cancel_the_next_one() {
    execute_batch(
        &test_config(),
        r#"
        CREATE SCHEMA IF NOT EXISTS remat_slow;
        DROP VIEW IF EXISTS remat_slow.accounts;
        DROP TABLE IF EXISTS remat_slow.base;
        CREATE TABLE remat_slow.base (id BIGINT PRIMARY KEY, name TEXT NOT NULL, balance BIGINT NOT NULL);
        INSERT INTO remat_slow.base VALUES (7, 'A', 42), (9, 'Z', 0);
        CREATE OR REPLACE FUNCTION remat_slow.slow(b BIGINT) RETURNS BIGINT AS $$
            SELECT pg_sleep(2);
            SELECT b;
        $$ LANGUAGE sql VOLATILE;
        CREATE VIEW remat_slow.accounts AS
            SELECT id, name, CASE WHEN id = 9 THEN remat_slow.slow(balance) ELSE balance END AS balance
            FROM remat_slow.base;
        "#,
    )
    .await;

    let config = test_config().with_query_timeout(Duration::from_millis(300));
    let stats = Arc::new(RecordingStats::new());
    let remat = configure("remat_slow", "accounts", account_columns(), &["id"], &config, stats.clone())
        .await
        .unwrap();

    let outcome = remat.fetch(&[Value::BigInt(9)], 1).await.unwrap();
    assert_eq!(outcome, None);
    assert_eq!(remat.health().await, HealthState::Connected);
    assert_eq!(stats.count("postgres_query_timeout"), 1);

    for _ in 0..5 {
        let row = remat.fetch(&[Value::BigInt(7)], 1).await.unwrap();
        assert_eq!(row, Some(account_row(7, "A", 42)));
    }
    assert_eq!(stats.count("postgres_query_timeout"), 1);
}
