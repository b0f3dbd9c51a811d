use remat_core::{BackendKind, RematConfig};
use remat_pg::create_pool;

/// Connection settings for the live test database.
///
/// Reads the usual `REMAT_*` variables and falls back to a local server.
pub fn test_config() -> RematConfig {
    match RematConfig::from_env() {
        Ok(config) => config,
        Err(_) => RematConfig::new(BackendKind::Postgres)
            .with_hostnames(["localhost"])
            .with_credentials("postgres", "")
            .with_database("postgres"),
    }
}

/// Run setup SQL on a connection outside the rematerializer.
pub async fn execute_batch(config: &RematConfig, sql: &str) {
    let pool = create_pool(config).expect("Failed to create pool");
    let client = pool.get().await.expect("Failed to connect to test database");
    client.batch_execute(sql).await.expect("Setup SQL failed");
}
