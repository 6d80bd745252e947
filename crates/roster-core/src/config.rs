use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::types::Tags;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    pub membership: MembershipConfig,
    pub gossip: GossipConfig,
}

/// Identity and bootstrap parameters of one node. Immutable once a
/// `Membership` has been started from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipConfig {
    /// Must be unique within the cluster.
    pub node_name: String,
    pub bind_addr: String,
    pub tags: Tags,
    pub join_addrs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipConfig {
    pub tombstone_timeout_ms: u64,
    pub reap_interval_ms: u64,
    pub query_timeout_ms: u64,
    pub leave_timeout_ms: u64,
    pub event_buffer_size: usize,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            bind_addr: "127.0.0.1:7946".to_string(),
            tags: Tags::new(),
            join_addrs: vec![],
        }
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            tombstone_timeout_ms: 24 * 60 * 60 * 1000,
            reap_interval_ms: 15_000,
            query_timeout_ms: 5_000,
            leave_timeout_ms: 5_000,
            event_buffer_size: 64,
        }
    }
}

impl GossipConfig {
    pub fn tombstone_timeout(&self) -> Duration {
        Duration::from_millis(self.tombstone_timeout_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn leave_timeout(&self) -> Duration {
        Duration::from_millis(self.leave_timeout_ms)
    }
}

impl NodeConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(NodeConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("ROSTER_").split("__"));

        figment.extract()
    }
}
