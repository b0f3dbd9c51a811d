//! Session construction.
//!
//! The driver keeps its own per-node connection pools behind one
//! [`Session`]. Building a session contacts the cluster, so configuration is
//! checked up front and the session itself is only built on connect.

use remat_core::{BackendError, BackendKind, ConfigError, RematConfig, RematResult};
use scylla::client::execution_profile::ExecutionProfile;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::policies::load_balancing::DefaultPolicy;

use crate::error::classify_session_error;

/// Extra config key naming the datacenter to route requests to first.
pub const LOCAL_DATACENTER_OPTION: &str = "local_datacenter";

/// Validated settings for building sessions against one cluster.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    known_nodes: Vec<String>,
    credentials: Option<(String, String)>,
    local_datacenter: Option<String>,
    config: RematConfig,
}

impl SessionSettings {
    /// Check a `cassandra` configuration. No connection is attempted here.
    pub fn from_config(config: &RematConfig) -> RematResult<Self> {
        if config.backend != BackendKind::Cassandra {
            return Err(ConfigError::BackendNotSupported {
                backend: config.backend.to_string(),
            }
            .into());
        }
        config.validate()?;

        let known_nodes = config
            .hostnames
            .iter()
            .map(|host| format!("{}:{}", host, config.port))
            .collect();
        let credentials = config
            .username
            .as_ref()
            .map(|user| (user.clone(), config.password.clone().unwrap_or_default()));

        Ok(Self {
            known_nodes,
            credentials,
            local_datacenter: config.option(LOCAL_DATACENTER_OPTION).map(str::to_string),
            config: config.clone(),
        })
    }

    pub fn known_nodes(&self) -> &[String] {
        &self.known_nodes
    }

    pub fn local_datacenter(&self) -> Option<&str> {
        self.local_datacenter.as_deref()
    }

    pub fn config(&self) -> &RematConfig {
        &self.config
    }

    fn execution_profile(&self) -> ExecutionProfile {
        let mut policy = DefaultPolicy::builder().token_aware(true);
        if let Some(dc) = &self.local_datacenter {
            policy = policy.prefer_datacenter(dc.clone());
        }
        ExecutionProfile::builder()
            .request_timeout(Some(self.config.query_timeout))
            .load_balancing_policy(policy.build())
            .build()
    }

    /// Contact the cluster and open a session.
    pub async fn connect(&self) -> Result<Session, BackendError> {
        let mut builder = SessionBuilder::new()
            .known_nodes(&self.known_nodes)
            .connection_timeout(self.config.connect_timeout)
            .default_execution_profile_handle(self.execution_profile().into_handle());
        if let Some((user, password)) = &self.credentials {
            builder = builder.user(user, password);
        }

        let session = builder.build().await.map_err(|e| classify_session_error(&e))?;
        tracing::debug!(
            nodes = %self.known_nodes.join(","),
            local_datacenter = ?self.local_datacenter,
            "Opened Cassandra session"
        );
        Ok(session)
    }
}
