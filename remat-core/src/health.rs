//! Backend connectivity state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tri-state connectivity status gating whether a fetch is attempted.
///
/// Transitions:
/// - `Disconnected -> Connected` on a successful configure or reconnect
/// - `Connected -> Broken` on a fatal fetch failure
/// - `Connected -> Disconnected` on disconnect
///
/// `Broken` survives disconnect. Only an explicit reconnect clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Connected,
    Disconnected,
    Broken,
}

impl HealthState {
    pub fn is_connected(self) -> bool {
        self == HealthState::Connected
    }

    pub fn is_broken(self) -> bool {
        self == HealthState::Broken
    }

    /// State after the session has been torn down.
    pub fn after_disconnect(self) -> Self {
        match self {
            HealthState::Broken => HealthState::Broken,
            HealthState::Connected | HealthState::Disconnected => HealthState::Disconnected,
        }
    }

    /// State after a connection attempt.
    pub fn after_connect(connected: bool) -> Self {
        if connected {
            HealthState::Connected
        } else {
            HealthState::Disconnected
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            HealthState::Connected => "connected",
            HealthState::Disconnected => "disconnected",
            HealthState::Broken => "broken",
        };
        write!(f, "{}", value)
    }
}
