//! Core E2E testing framework

use anyhow::{Context, Result};
use config::{ConnectorConfig, GatewayConfig, ManagedNodes, ManagementConfig, RefreshPolicy};
use federation::{Connector, Gateway, Management};
use network::{FabricConfig, FabricService, InvocationService, JoinRequest, LocalFabric};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use types::{MemberId, ProductVersion};

/// How one member of a test cluster is configured.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub name: String,
    pub managed_nodes: ManagedNodes,
    pub refresh_policy: RefreshPolicy,
    pub refresh_timeout_millis: u64,
    pub version: ProductVersion,
    pub address: IpAddr,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            managed_nodes: ManagedNodes::None,
            refresh_policy: RefreshPolicy::Expired,
            refresh_timeout_millis: 1000,
            version: ProductVersion::CURRENT,
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }

    pub fn managed(mut self, managed_nodes: ManagedNodes) -> Self {
        self.managed_nodes = managed_nodes;
        self
    }

    pub fn refresh(mut self, policy: RefreshPolicy, ttl_millis: u64) -> Self {
        self.refresh_policy = policy;
        self.refresh_timeout_millis = ttl_millis;
        self
    }

    pub fn version(mut self, version: ProductVersion) -> Self {
        self.version = version;
        self
    }

    fn management_config(&self) -> ManagementConfig {
        ManagementConfig {
            connector: ConnectorConfig {
                managed_nodes: self.managed_nodes,
                refresh_policy: self.refresh_policy,
                refresh_timeout_millis: self.refresh_timeout_millis,
                ..ConnectorConfig::default()
            },
            gateway: GatewayConfig {
                cluster_name: "e2e".to_string(),
                ..GatewayConfig::default()
            },
        }
    }
}

/// One started member.
pub struct TestNode {
    pub name: String,
    pub service: Arc<FabricService>,
    pub management: Management,
}

impl TestNode {
    pub fn id(&self) -> MemberId {
        self.service.local_member().id()
    }

    pub fn connector(&self) -> &Arc<Connector> {
        self.management.connector()
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        self.management.gateway()
    }

    /// Whether this member knows `other` as a management server.
    pub fn knows_server(&self, other: &TestNode) -> bool {
        self.connector().is_remote_server(other.id())
    }

    /// Whether the managing view of this member holds `name`.
    pub fn view_has(&self, name: &str) -> bool {
        self.connector()
            .view()
            .map_or(false, |view| view.is_registered(name))
    }
}

/// Members sharing one in-process fabric.
pub struct TestCluster {
    fabric: LocalFabric,
    nodes: Vec<TestNode>,
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCluster {
    pub fn new() -> Self {
        Self {
            fabric: LocalFabric::new(FabricConfig {
                service_name: "Management".to_string(),
                request_timeout: Duration::from_secs(2),
            }),
            nodes: Vec::new(),
        }
    }

    pub fn fabric(&self) -> &LocalFabric {
        &self.fabric
    }

    /// Join and start a member; returns its index in the cluster.
    pub fn start_node(&mut self, spec: NodeSpec) -> Result<usize> {
        let request = JoinRequest::new(spec.address)
            .with_name(spec.name.clone())
            .with_version(spec.version)
            .with_dynamic_management(spec.managed_nodes == ManagedNodes::Dynamic);
        let service = self.fabric.join(request);

        let management = Management::new(spec.management_config(), service.clone())
            .with_context(|| format!("Failed to create management for {}", spec.name))?;
        management
            .start()
            .with_context(|| format!("Failed to start management for {}", spec.name))?;
        info!(node = %spec.name, member = service.local_member().id(), "Test node started");

        self.nodes.push(TestNode {
            name: spec.name,
            service,
            management,
        });
        Ok(self.nodes.len() - 1)
    }

    pub fn node(&self, index: usize) -> &TestNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[TestNode] {
        &self.nodes
    }

    /// Stop a member's service; every remaining member sees it leave.
    pub fn stop_node(&self, index: usize) {
        let node = &self.nodes[index];
        info!(node = %node.name, member = node.id(), "Stopping test node");
        node.management.shutdown();
    }

    pub fn shutdown(&self) {
        for node in self.nodes.iter().rev() {
            if node.service.is_running() {
                node.management.shutdown();
            }
        }
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        self.shutdown();
    }
}
