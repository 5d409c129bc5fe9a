//! Actor directory configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_actor_ttl_secs() -> u64 {
    300
}

const fn default_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectoryConfig {
    /// Base URL of the actor directory service. Empty means no remote directory.
    #[serde(default)]
    pub base_url: String,

    /// Optional bearer token sent to the directory service.
    #[serde(default)]
    pub api_key: String,

    /// How long actor-existence answers stay cached.
    #[serde(default = "default_actor_ttl_secs")]
    pub actor_ttl_secs: u64,

    /// Per-request timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            actor_ttl_secs: default_actor_ttl_secs(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl DirectoryConfig {
    /// Whether a remote directory is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }

    #[must_use]
    pub const fn actor_ttl(&self) -> Duration {
        Duration::from_secs(self.actor_ttl_secs)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_not_configured() {
        let config = DirectoryConfig::default();
        assert!(!config.is_configured());
        assert_eq!(config.actor_ttl(), Duration::from_secs(300));
        assert_eq!(config.timeout(), Duration::from_secs(2));
    }
}
