//! Members of the demo cluster and their beans.

use anyhow::{Context, Result};
use config::{ClusterConfig, ManagedNodes, NodeConfig};
use federation::{
    ConnectorState, Management, ManagedObject, RemoteModelReport, SimpleBean, StatsSnapshot,
};
use network::{FabricService, InvocationService, JoinRequest, LocalFabric};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use types::{MemberId, Value};

pub struct ClusterNode {
    label: String,
    service: Arc<FabricService>,
    management: Management,
    caches: Vec<Arc<SimpleBean>>,
}

/// What one member reports on each tick.
#[derive(Debug, Serialize)]
pub struct NodeReport {
    pub member: MemberId,
    pub label: String,
    pub state: ConnectorState,
    pub managing: bool,
    pub view_size: usize,
    pub stats: StatsSnapshot,
    pub remote_models: Vec<RemoteModelReport>,
}

impl ClusterNode {
    pub fn join(fabric: &LocalFabric, cluster: &ClusterConfig, node: &NodeConfig) -> Result<Self> {
        let management_config = cluster.node_management(node);
        let dynamic = management_config.connector.managed_nodes == ManagedNodes::Dynamic;

        let mut request = JoinRequest::new(node.address)
            .with_version(node.product_version()?)
            .with_dynamic_management(dynamic);
        if let Some(name) = &node.name {
            request = request.with_name(name.clone());
        }
        let service = fabric.join(request);
        let member = service.local_member().member;
        let label = node.name.clone().unwrap_or_else(|| format!("member-{}", member.id));

        let management = Management::new(management_config, service.clone())
            .with_context(|| format!("Failed to create management for {}", label))?;

        let mut caches = Vec::with_capacity(node.caches.len());
        for cache in &node.caches {
            let bean = Arc::new(
                SimpleBean::new("Cache")
                    .with_description(format!("Cache {}", cache))
                    .with_attribute("Size", 0i64)
                    .with_writable("ExpiryDelay", 0i64),
            );
            caches.push(bean);
        }

        Ok(Self {
            label,
            service,
            management,
            caches,
        })
    }

    pub fn id(&self) -> MemberId {
        self.service.local_member().member.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn management(&self) -> &Management {
        &self.management
    }

    /// Join the federation and register the node and cache beans.
    pub fn start(&self, node: &NodeConfig) -> Result<()> {
        self.management.start()?;

        let member = self.management.local_member();
        let node_bean = SimpleBean::new("ClusterNode")
            .with_attribute("Id", i64::from(member.id))
            .with_attribute("MemberName", self.label.clone())
            .with_attribute("Address", member.address.to_string())
            .with_attribute("Version", member.version.to_string());
        self.management
            .register("type=Node", ManagedObject::ClusterNode(Arc::new(node_bean)))?;

        for (cache, bean) in node.caches.iter().zip(&self.caches) {
            let name = self.management.register(
                &format!("type=Cache,service=DistributedCache,name={}", cache),
                ManagedObject::Cache(bean.clone()),
            )?;
            debug!(member = member.id, %name, "Registered cache bean");
        }
        info!(member = member.id, label = %self.label, "Node started");
        Ok(())
    }

    /// Simulated cache activity.
    pub fn touch_caches(&self, tick: u64) {
        for (i, bean) in self.caches.iter().enumerate() {
            let size = (tick as i64 + 1) * (i as i64 + 1) * 10;
            bean.update("Size", Value::from(size));
        }
    }

    pub fn report(&self) -> NodeReport {
        let connector = self.management.connector();
        NodeReport {
            member: self.id(),
            label: self.label.clone(),
            state: self.management.state(),
            managing: connector.is_managing(),
            view_size: connector.view().map(|view| view.len()).unwrap_or(0),
            stats: self.management.stats(),
            remote_models: connector.report_remote_models(),
        }
    }

    pub fn shutdown(&self) {
        self.management.shutdown();
        info!(label = %self.label, "Node left the cluster");
    }
}

/// Join and start every configured node, in file order.
pub fn start_cluster(fabric: &LocalFabric, cluster: &ClusterConfig) -> Result<Vec<ClusterNode>> {
    let mut nodes = Vec::with_capacity(cluster.nodes.len());
    for config in &cluster.nodes {
        let node = ClusterNode::join(fabric, cluster, config)?;
        node.start(config)?;
        nodes.push(node);
    }
    Ok(nodes)
}
