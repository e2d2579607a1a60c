//! TOML configuration for the Stow daemon.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::bail;
use serde::Deserialize;
use stow_engine::ShardConfig;
use stow_types::{NodeAddr, NodeId, ShardId};

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Local process settings.
    pub node: NodeSection,
    /// The shard this daemon ingests for.
    pub shard: ShardSection,
    /// Static registry of storage nodes.
    pub storage_nodes: Vec<StorageNode>,
    /// Replication tuning.
    pub replication: ReplicationSection,
    /// Outbound HTTP settings.
    pub transport: TransportSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Directory for transient spool files.
    pub spool_dir: PathBuf,
    /// Address for the inbound HTTP API.
    pub listen_addr: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        let spool_dir = dirs::home_dir()
            .map(|h| h.join(".stow").join("spool"))
            .unwrap_or_else(|| PathBuf::from(".stow/spool"));
        Self {
            spool_dir,
            listen_addr: "0.0.0.0:4830".to_string(),
        }
    }
}

/// `[shard]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ShardSection {
    /// Shard identifier.
    pub id: u32,
    /// Assigned node ids. Every object is stored on all of them.
    pub nodes: Vec<String>,
    /// Capacity limit in bytes. Unlimited when absent.
    pub capacity_bytes: Option<u64>,
}

/// One `[[storage_nodes]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageNode {
    /// Node id referenced from `[shard] nodes`.
    pub id: String,
    /// Host name or IP address.
    pub host: String,
    /// HTTP port.
    pub port: u16,
}

/// `[replication]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReplicationSection {
    /// Maximum number of replication transfers in flight.
    pub concurrent_transfers: u16,
}

impl Default for ReplicationSection {
    fn default() -> Self {
        Self {
            concurrent_transfers: 8,
        }
    }
}

/// `[transport]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    /// Connection timeout towards storage nodes, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Check that the shard can be served with this registry.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.shard.nodes.is_empty() {
            bail!("[shard] nodes is empty");
        }

        let mut ids = HashSet::new();
        for node in &self.storage_nodes {
            if !ids.insert(node.id.as_str()) {
                bail!("storage node {} is defined more than once", node.id);
            }
        }
        for node in &self.shard.nodes {
            if !ids.contains(node.as_str()) {
                bail!("shard node {node} is not defined in [[storage_nodes]]");
            }
        }
        Ok(())
    }

    /// Node registry as `(id, address)` pairs.
    pub fn registry(&self) -> Vec<(NodeId, NodeAddr)> {
        self.storage_nodes
            .iter()
            .map(|n| (NodeId::new(n.id.clone()), NodeAddr::new(n.host.clone(), n.port)))
            .collect()
    }

    /// Shard identity and node set.
    pub fn shard_config(&self) -> ShardConfig {
        ShardConfig {
            id: self.shard_id(),
            nodes: self.shard.nodes.iter().map(NodeId::new).collect(),
        }
    }

    /// Shard identifier.
    pub fn shard_id(&self) -> ShardId {
        ShardId::from(self.shard.id)
    }

    /// Per-shard capacity limits for the coordinator.
    pub fn capacity_limits(&self) -> HashMap<ShardId, u64> {
        self.shard
            .capacity_bytes
            .map(|limit| HashMap::from([(self.shard_id(), limit)]))
            .unwrap_or_default()
    }

    /// Effective connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.transport.connect_timeout_ms)
    }
}
