use remat_cassandra::SessionSettings;
use remat_core::{BackendKind, RematConfig};

/// Connection settings for the live test cluster.
///
/// Reads the usual `REMAT_*` variables and falls back to a local node.
pub fn test_config() -> RematConfig {
    match RematConfig::from_env() {
        Ok(config) if config.backend == BackendKind::Cassandra => config,
        _ => RematConfig::new(BackendKind::Cassandra).with_hostnames(["127.0.0.1"]),
    }
}

/// Run setup CQL statements on a session outside the rematerializer.
pub async fn execute_batch(config: &RematConfig, statements: &[&str]) {
    let session = SessionSettings::from_config(config)
        .expect("Invalid test configuration")
        .connect()
        .await
        .expect("Failed to connect to test cluster");
    for cql in statements {
        session
            .query_unpaged(*cql, ())
            .await
            .unwrap_or_else(|e| panic!("Setup CQL failed: {cql}: {e}"));
    }
}
