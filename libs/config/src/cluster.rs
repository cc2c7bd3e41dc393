//! In-process cluster definitions.

use crate::connector::ManagedNodes;
use crate::loader::{load_layered, ManagementConfig, ENV_PREFIX};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use types::ProductVersion;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub name: String,
    /// Defaults applied to every node
    pub management: ManagementConfig,
    pub nodes: Vec<NodeConfig>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "cluster".to_string(),
            management: ManagementConfig::default(),
            nodes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: Option<String>,
    #[serde(default = "default_address")]
    pub address: IpAddr,
    /// Product version the node reports, e.g. `14.1.2.0.0`
    #[serde(default = "default_version")]
    pub version: String,
    /// Overrides `management.connector.managed_nodes` for this node
    #[serde(default)]
    pub managed_nodes: Option<ManagedNodes>,
    /// Caches the node registers at start
    #[serde(default)]
    pub caches: Vec<String>,
}

fn default_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_version() -> String {
    ProductVersion::CURRENT.to_string()
}

impl NodeConfig {
    pub fn product_version(&self) -> Result<ProductVersion> {
        self.version
            .parse()
            .with_context(|| format!("Invalid version for node {:?}", self.name))
    }
}

impl ClusterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Self = load_layered(Some(path), ENV_PREFIX)?;
        if config.management.gateway.cluster_name == "cluster" {
            config.management.gateway.cluster_name = config.name.clone();
        }
        config.validate()?;
        Ok(config)
    }

    /// Effective management settings for one node.
    pub fn node_management(&self, node: &NodeConfig) -> ManagementConfig {
        let mut management = self.management.clone();
        if let Some(managed) = node.managed_nodes {
            management.connector.managed_nodes = managed;
        }
        management
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            bail!("cluster '{}' defines no nodes", self.name);
        }
        self.management.validate()?;

        let mut names = HashSet::new();
        for node in &self.nodes {
            node.product_version()?;
            if let Some(name) = &node.name {
                if !names.insert(name.as_str()) {
                    bail!("node name '{}' is used more than once", name);
                }
            }
        }
        Ok(())
    }
}
