#![cfg(feature = "db-tests")]

//! Rematerializer against a live Cassandra or ScyllaDB node.

mod support;

use std::sync::Arc;

use remat_cassandra::configure;
use remat_core::{ColumnDescriptor, DataType, HealthState, RematError, Value};
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

async fn seed_accounts(keyspace: &str) {
    let create_keyspace = format!(
        "CREATE KEYSPACE IF NOT EXISTS {keyspace} \
         WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': 1}}"
    );
    let drop_table = format!("DROP TABLE IF EXISTS {keyspace}.accounts");
    let create_table = format!(
        "CREATE TABLE {keyspace}.accounts (balance bigint, name text, id bigint PRIMARY KEY)"
    );
    let insert_a = format!("INSERT INTO {keyspace}.accounts (id, name, balance) VALUES (7, 'A', 42)");
    let insert_b = format!("INSERT INTO {keyspace}.accounts (id, name, balance) VALUES (8, 'B', -3)");
    execute_batch(
        &test_config(),
        &[&create_keyspace, &drop_table, &create_table, &insert_a, &insert_b],
    )
    .await;
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
    assert_eq!(stats.count("cassandra_query_ms"), 3);
}

#[tokio::test]
async fn test_missing_table_fails_closed() {
    seed_accounts("remat_absent").await;
    execute_batch(&test_config(), &["DROP TABLE IF EXISTS remat_absent.accounts"]).await;
    let stats = Arc::new(RecordingStats::new());
    let remat = configure(
        "remat_absent",
        "accounts",
        account_columns(),
        &["id"],
        &test_config(),
        stats.clone(),
    )
    .await
    .unwrap();

    let result = remat.fetch(&[Value::BigInt(7)], 1).await;
    assert!(matches!(result, Err(RematError::UnclassifiedFetch { .. })));
    assert_eq!(remat.health().await, HealthState::Broken);
    assert_eq!(stats.count("cassandra_fetch_error"), 1);
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
