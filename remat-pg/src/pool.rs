//! Connection pool construction.
//!
//! The adapter holds at most one pooled session at a time. The pool exists
//! for host selection, connect timeouts and to hand out a fresh connection on
//! reconnect.

use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts};
use remat_core::{BackendKind, ConfigError, RematConfig, RematResult};
use tokio_postgres::NoTls;

/// Extra config key naming the session in `pg_stat_activity`.
pub const APPLICATION_NAME_OPTION: &str = "application_name";

const DEFAULT_APPLICATION_NAME: &str = "remat";

/// Create a connection pool for a `postgres` configuration.
///
/// No connection is attempted here.
pub fn create_pool(config: &RematConfig) -> RematResult<Pool> {
    if config.backend != BackendKind::Postgres {
        return Err(ConfigError::BackendNotSupported {
            backend: config.backend.to_string(),
        }
        .into());
    }
    config.validate()?;

    let mut cfg = Config::new();
    cfg.hosts = Some(config.hostnames.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.effective_database().to_string());
    cfg.user = config.username.clone();
    cfg.password = config.password.clone();
    cfg.application_name = Some(
        config
            .option(APPLICATION_NAME_OPTION)
            .unwrap_or(DEFAULT_APPLICATION_NAME)
            .to_string(),
    );
    cfg.connect_timeout = Some(config.connect_timeout);

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig {
        max_size: config.pool_size,
        timeouts: Timeouts {
            wait: Some(config.connect_timeout),
            create: Some(config.connect_timeout),
            recycle: Some(config.connect_timeout),
        },
        ..PoolConfig::default()
    });

    let pool = cfg
        .create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| ConfigError::InvalidValue {
            field: "postgres".to_string(),
            value: config.hostnames.join(","),
            reason: format!("Failed to create pool: {}", e),
        })?;

    tracing::debug!(
        hosts = %config.hostnames.join(","),
        port = config.port,
        max_size = config.pool_size,
        "Created PostgreSQL pool"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use remat_core::RematError;

    fn postgres_config() -> RematConfig {
        RematConfig::new(BackendKind::Postgres)
            .with_hostnames(["db1.internal", "db2.internal"])
            .with_credentials("remat", "secret")
            .with_database("bank")
            .with_pool_size(2)
    }

    #[tokio::test]
    async fn test_create_pool_does_not_connect() {
        let pool = create_pool(&postgres_config()).unwrap();
        let status = pool.status();
        assert_eq!(status.max_size, 2);
        assert_eq!(status.size, 0);
    }

    #[tokio::test]
    async fn test_create_pool_without_database() {
        let config = RematConfig::new(BackendKind::Postgres).with_hostnames(["localhost"]);
        assert!(config.validate().is_ok());
        let pool = create_pool(&config).unwrap();
        assert_eq!(pool.status().size, 0);

        let config = config.with_credentials("cache", "secret");
        assert!(create_pool(&config).is_ok());
    }

    #[test]
    fn test_create_pool_rejects_memory_backend() {
        let err = create_pool(&RematConfig::new(BackendKind::Memory)).unwrap_err();
        assert!(matches!(
            err,
            RematError::Configuration(ConfigError::BackendNotSupported { .. })
        ));
    }

    #[test]
    fn test_create_pool_requires_hosts() {
        let err = create_pool(&RematConfig::new(BackendKind::Postgres)).unwrap_err();
        assert!(matches!(
            err,
            RematError::Configuration(ConfigError::MissingRequired { .. })
        ));
    }
}
