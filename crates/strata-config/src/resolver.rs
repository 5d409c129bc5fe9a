//! Precedence resolver configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

const fn default_membership_ttl_secs() -> u64 {
    300
}

const fn default_max_depth() -> u32 {
    3
}

const fn default_node_budget() -> u32 {
    500
}

const fn default_path_budget() -> u32 {
    10_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// How long a caller's realm membership stays cached.
    #[serde(default = "default_membership_ttl_secs")]
    pub membership_ttl_secs: u64,

    /// Traversal depth when the caller does not pass one.
    #[serde(default = "default_max_depth")]
    pub default_max_depth: u32,

    /// Upper bound on nodes visited by one traversal.
    #[serde(default = "default_node_budget")]
    pub node_budget: u32,

    /// Upper bound on partial paths expanded by one connection search.
    #[serde(default = "default_path_budget")]
    pub path_budget: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            membership_ttl_secs: default_membership_ttl_secs(),
            default_max_depth: default_max_depth(),
            node_budget: default_node_budget(),
            path_budget: default_path_budget(),
        }
    }
}

impl ResolverConfig {
    #[must_use]
    pub const fn membership_ttl(&self) -> Duration {
        Duration::from_secs(self.membership_ttl_secs)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.node_budget == 0 {
            return Err(ConfigError::invalid(
                "resolver.node_budget",
                "must be greater than zero",
            ));
        }
        if self.path_budget == 0 {
            return Err(ConfigError::invalid(
                "resolver.path_budget",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
