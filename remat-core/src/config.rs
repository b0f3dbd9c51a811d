//! Backend configuration
//!
//! Configuration arrives as a flat string property map (the same shape the
//! cache passes at configure time) or from `REMAT_*` environment variables.
//! It is parsed and validated exactly once.

use crate::error::{ConfigError, RematResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Property keys understood by [`RematConfig::from_properties`].
pub mod keys {
    pub const BACKEND: &str = "backend";
    pub const HOSTNAMES: &str = "hostnames";
    pub const PORT: &str = "port";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const DATABASE: &str = "database";
    pub const POOL_SIZE: &str = "pool_size";
    pub const QUERY_TIMEOUT_MS: &str = "query_timeout_ms";
    pub const CONNECT_TIMEOUT_MS: &str = "connect_timeout_ms";

    pub const ALL: [&str; 9] = [
        BACKEND,
        HOSTNAMES,
        PORT,
        USERNAME,
        PASSWORD,
        DATABASE,
        POOL_SIZE,
        QUERY_TIMEOUT_MS,
        CONNECT_TIMEOUT_MS,
    ];
}

const DEFAULT_QUERY_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_POOL_SIZE: usize = 4;
const DEFAULT_DATABASE: &str = "postgres";

/// System of record technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Postgres,
    Cassandra,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Postgres => "postgres",
            BackendKind::Cassandra => "cassandra",
            BackendKind::Memory => "memory",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            BackendKind::Postgres => 5432,
            BackendKind::Cassandra => 9042,
            BackendKind::Memory => 0,
        }
    }

    /// Whether the backend is reached over the network.
    pub fn is_networked(&self) -> bool {
        matches!(self, BackendKind::Postgres | BackendKind::Cassandra)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(BackendKind::Postgres),
            "cassandra" | "scylla" | "cql" => Ok(BackendKind::Cassandra),
            "memory" | "in-memory" | "inmemory" => Ok(BackendKind::Memory),
            other => Err(ConfigError::BackendNotSupported {
                backend: other.to_string(),
            }),
        }
    }
}

/// Connection settings for one rematerializer's backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RematConfig {
    pub backend: BackendKind,
    /// Backend nodes, tried in order.
    pub hostnames: Vec<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub pool_size: usize,
    /// Upper bound on a single execute call.
    pub query_timeout: Duration,
    pub connect_timeout: Duration,
    /// Backend-specific keys not recognised above.
    pub options: BTreeMap<String, String>,
}

impl fmt::Debug for RematConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RematConfig")
            .field("backend", &self.backend)
            .field("hostnames", &self.hostnames)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("pool_size", &self.pool_size)
            .field("query_timeout", &self.query_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("options", &self.options)
            .finish()
    }
}

impl RematConfig {
    /// A configuration for `backend` with default timeouts and no hosts.
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            hostnames: Vec::new(),
            port: backend.default_port(),
            username: None,
            password: None,
            database: None,
            pool_size: DEFAULT_POOL_SIZE,
            query_timeout: Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            options: BTreeMap::new(),
        }
    }

    pub fn with_hostnames<I, S>(mut self, hostnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hostnames = hostnames.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Parse and validate a property map.
    ///
    /// `backend` is required. `hostnames` is a comma-separated list. Keys
    /// outside [`keys::ALL`] are kept in `options`.
    pub fn from_properties(props: &HashMap<String, String>) -> RematResult<Self> {
        let backend: BackendKind = props
            .get(keys::BACKEND)
            .ok_or_else(|| ConfigError::MissingRequired {
                field: keys::BACKEND.to_string(),
            })?
            .parse()?;

        let mut config = Self::new(backend);

        if let Some(hosts) = props.get(keys::HOSTNAMES) {
            config.hostnames = hosts
                .split(',')
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect();
        }
        if let Some(port) = props.get(keys::PORT) {
            config.port = parse_field(keys::PORT, port)?;
        }
        config.username = props.get(keys::USERNAME).cloned();
        config.password = props.get(keys::PASSWORD).cloned();
        config.database = props.get(keys::DATABASE).cloned();
        if let Some(size) = props.get(keys::POOL_SIZE) {
            config.pool_size = parse_field(keys::POOL_SIZE, size)?;
        }
        if let Some(ms) = props.get(keys::QUERY_TIMEOUT_MS) {
            config.query_timeout = Duration::from_millis(parse_field(keys::QUERY_TIMEOUT_MS, ms)?);
        }
        if let Some(ms) = props.get(keys::CONNECT_TIMEOUT_MS) {
            config.connect_timeout =
                Duration::from_millis(parse_field(keys::CONNECT_TIMEOUT_MS, ms)?);
        }

        config.options = props
            .iter()
            .filter(|(k, _)| !keys::ALL.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from environment variables.
    ///
    /// Each key in [`keys::ALL`] is read from `REMAT_<KEY>` (for example
    /// `REMAT_HOSTNAMES`, `REMAT_QUERY_TIMEOUT_MS`).
    pub fn from_env() -> RematResult<Self> {
        let props = keys::ALL
            .iter()
            .filter_map(|key| {
                std::env::var(format!("REMAT_{}", key.to_ascii_uppercase()))
                    .ok()
                    .map(|v| (key.to_string(), v))
            })
            .collect::<HashMap<_, _>>();
        Self::from_properties(&props)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - networked backends have at least one hostname and a non-zero port
    /// - pool_size >= 1
    /// - both timeouts are positive
    pub fn validate(&self) -> RematResult<()> {
        if self.backend.is_networked() {
            if self.hostnames.is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: keys::HOSTNAMES.to_string(),
                }
                .into());
            }
            if self.port == 0 {
                return Err(invalid(keys::PORT, "0", "port must be non-zero").into());
            }
        }
        if self.pool_size == 0 {
            return Err(invalid(keys::POOL_SIZE, "0", "pool_size must be at least 1").into());
        }
        if self.query_timeout.is_zero() {
            return Err(invalid(keys::QUERY_TIMEOUT_MS, "0", "timeout must be positive").into());
        }
        if self.connect_timeout.is_zero() {
            return Err(invalid(keys::CONNECT_TIMEOUT_MS, "0", "timeout must be positive").into());
        }
        Ok(())
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// PostgreSQL database to open: `database`, else the username, else
    /// `postgres`.
    pub fn effective_database(&self) -> &str {
        self.database
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or(DEFAULT_DATABASE)
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_field<T>(field: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(field, value, &e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RematError;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_properties_postgres() {
        let config = RematConfig::from_properties(&props(&[
            ("backend", "PostgreSQL"),
            ("hostnames", "db1, db2,,"),
            ("port", "6432"),
            ("username", "cache"),
            ("password", "secret"),
            ("database", "ledger"),
            ("query_timeout_ms", "250"),
            ("application_name", "remat"),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendKind::Postgres);
        assert_eq!(config.hostnames, vec!["db1", "db2"]);
        assert_eq!(config.port, 6432);
        assert_eq!(config.username.as_deref(), Some("cache"));
        assert_eq!(config.database.as_deref(), Some("ledger"));
        assert_eq!(config.query_timeout, Duration::from_millis(250));
        assert_eq!(config.connect_timeout, Duration::from_millis(5_000));
        assert_eq!(config.option("application_name"), Some("remat"));
        assert_eq!(config.option("port"), None);
    }

    #[test]
    fn test_missing_backend() {
        let err = RematConfig::from_properties(&props(&[("hostnames", "db1")])).unwrap_err();
        assert!(matches!(
            err,
            RematError::Configuration(ConfigError::MissingRequired { ref field }) if field == "backend"
        ));
    }

    #[test]
    fn test_unsupported_backend() {
        let err = RematConfig::from_properties(&props(&[("backend", "oracle")])).unwrap_err();
        assert!(matches!(
            err,
            RematError::Configuration(ConfigError::BackendNotSupported { .. })
        ));
    }

    #[test]
    fn test_postgres_requires_hosts() {
        let err = RematConfig::from_properties(&props(&[("backend", "postgres")])).unwrap_err();
        assert!(matches!(
            err,
            RematError::Configuration(ConfigError::MissingRequired { ref field }) if field == "hostnames"
        ));
    }

    #[test]
    fn test_from_properties_cassandra() {
        let config = RematConfig::from_properties(&props(&[
            ("backend", "Cassandra"),
            ("hostnames", "cass1,cass2"),
            ("local_datacenter", "dc1"),
        ]))
        .unwrap();
        assert_eq!(config.backend, BackendKind::Cassandra);
        assert_eq!(config.port, 9042);
        assert_eq!(config.option("local_datacenter"), Some("dc1"));

        let err = RematConfig::from_properties(&props(&[("backend", "cql")])).unwrap_err();
        assert!(matches!(
            err,
            RematError::Configuration(ConfigError::MissingRequired { ref field }) if field == "hostnames"
        ));
    }

    #[test]
    fn test_memory_needs_no_hosts() {
        let config = RematConfig::from_properties(&props(&[("backend", "memory")])).unwrap();
        assert_eq!(config.backend, BackendKind::Memory);
        assert!(config.hostnames.is_empty());
    }

    #[test]
    fn test_invalid_numbers() {
        let err = RematConfig::from_properties(&props(&[
            ("backend", "postgres"),
            ("hostnames", "db1"),
            ("port", "seventy"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            RematError::Configuration(ConfigError::InvalidValue { ref field, .. }) if field == "port"
        ));

        let err = RematConfig::from_properties(&props(&[
            ("backend", "memory"),
            ("query_timeout_ms", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            RematError::Configuration(ConfigError::InvalidValue { ref field, .. }) if field == "query_timeout_ms"
        ));
    }

    #[test]
    fn test_builder() {
        let config = RematConfig::new(BackendKind::Postgres)
            .with_hostnames(["localhost"])
            .with_port(5433)
            .with_credentials("u", "p")
            .with_database("d")
            .with_pool_size(2)
            .with_query_timeout(Duration::from_millis(10));
        assert!(config.validate().is_ok());
        assert_eq!(config.pool_size, 2);

        let zero_pool = config.clone().with_pool_size(0);
        assert!(zero_pool.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = RematConfig::new(BackendKind::Postgres)
            .with_hostnames(["localhost"])
            .with_credentials("cache", "hunter2");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("[REDACTED]"));
        assert!(printed.contains("cache"));

        let anonymous = format!("{:?}", RematConfig::new(BackendKind::Memory));
        assert!(anonymous.contains("password: None"));
    }

    #[test]
    fn test_effective_database_defaults() {
        let config = RematConfig::new(BackendKind::Postgres).with_hostnames(["localhost"]);
        assert_eq!(config.effective_database(), "postgres");

        let config = config.with_credentials("cache", "secret");
        assert_eq!(config.effective_database(), "cache");

        let config = config.with_database("ledger");
        assert_eq!(config.effective_database(), "ledger");
    }
}
