//! Connector lifecycle, published endpoint and member health.

use config::{ConnectorConfig, ManagedNodes, ManagementConfig};
use federation::connector::CONNECTOR_URL_NAME;
use federation::{ConnectorState, HealthCheck, ManagedObject, Management};
use mgmt_e2e_tests::{counter_bean, eventually, NodeSpec, TestCluster, DEFAULT_WAIT};
use network::{InvocationService, JoinRequest, LocalFabric, LookupContext};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use types::Value;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[test_log::test(tokio::test)]
async fn test_stop_resets_the_connector() {
    let mut cluster = TestCluster::new();
    let manager = cluster
        .start_node(NodeSpec::new("manager").managed(ManagedNodes::All))
        .unwrap();
    let storage = cluster.start_node(NodeSpec::new("storage")).unwrap();
    let name = cluster
        .node(storage)
        .management
        .register("type=Cache,name=orders", ManagedObject::Cache(counter_bean("Cache", 0)))
        .unwrap();

    {
        let (manager, storage) = (cluster.node(manager), cluster.node(storage));
        assert!(
            eventually(DEFAULT_WAIT, || storage.management.state() == ConnectorState::Announced)
                .await
        );
        assert!(eventually(DEFAULT_WAIT, || manager.view_has(&name)).await);
    }

    cluster.stop_node(storage);
    let storage = cluster.node(storage);
    assert!(
        eventually(DEFAULT_WAIT, || storage.management.state() == ConnectorState::Stopped).await
    );
    assert!(!storage.connector().is_announced());
    assert!(storage.connector().remote_servers().is_empty());
    assert!(!storage.gateway().is_registered(&name));
    assert_eq!(storage.connector().local_member_id(), 0);
}

#[test_log::test(tokio::test)]
async fn test_service_restart_keeps_the_registry() {
    let mut cluster = TestCluster::new();
    let manager = cluster
        .start_node(NodeSpec::new("manager").managed(ManagedNodes::All))
        .unwrap();
    let storage = cluster.start_node(NodeSpec::new("storage")).unwrap();
    let name = cluster
        .node(storage)
        .management
        .register("type=Cache,name=orders", ManagedObject::Cache(counter_bean("Cache", 2)))
        .unwrap();
    let (manager, storage) = (cluster.node(manager), cluster.node(storage));
    assert!(eventually(DEFAULT_WAIT, || manager.view_has(&name)).await);

    // the service stops while the cluster keeps running
    storage.service.shutdown();
    assert!(
        eventually(DEFAULT_WAIT, || storage.management.state() == ConnectorState::Stopped).await
    );
    assert!(storage.connector().is_cluster_running());
    assert!(storage.connector().remote_servers().is_empty());
    assert!(storage.connector().local_model(&name).is_some());
    assert!(storage.gateway().is_registered(&name));
    assert!(eventually(DEFAULT_WAIT, || !manager.view_has(&name)).await);

    let restarted = cluster
        .fabric()
        .join(JoinRequest::new(LOCALHOST).with_name("storage"));
    let restarted_id = restarted.local_member().id();
    storage.connector().start_service(restarted).unwrap();

    assert!(
        eventually(DEFAULT_WAIT, || storage.connector().is_announced()).await,
        "restarted member never completed its announcement"
    );
    assert!(
        eventually(DEFAULT_WAIT, || {
            manager
                .connector()
                .remote_model(&name)
                .map_or(false, |model| model.owner().id == restarted_id)
        })
        .await,
        "the surviving registry was not pushed again"
    );
    assert!(manager.view_has(&name));
}

#[test_log::test(tokio::test)]
async fn test_endpoint_is_published_and_resolved() {
    let mut cluster = TestCluster::new();
    let manager = cluster
        .start_node(NodeSpec::new("manager").managed(ManagedNodes::All))
        .unwrap();
    let late = cluster.start_node(NodeSpec::new("late")).unwrap();

    let ctx = LookupContext {
        source: Some(LOCALHOST),
        accept: None,
    };
    let expected = "mgmt://127.0.0.1:9000/management".to_string();
    assert_eq!(
        cluster.fabric().name_service().lookup(CONNECTOR_URL_NAME, &ctx),
        Some(expected.clone())
    );

    let late = cluster.node(late);
    assert!(
        eventually(DEFAULT_WAIT, || late.connector().published_endpoint().url.is_some()).await,
        "late member never received the endpoint"
    );
    assert_eq!(
        late.connector().published_endpoint().listen_addresses,
        vec![LOCALHOST]
    );
    assert_eq!(late.connector().resolve(Some(LOCALHOST)), Some(expected));

    cluster.stop_node(manager);
    let name_service = cluster.fabric().name_service();
    assert!(eventually(DEFAULT_WAIT, || !name_service.is_bound(CONNECTOR_URL_NAME)).await);
}

#[test_log::test(tokio::test)]
async fn test_start_failure_is_sticky() {
    let fabric = LocalFabric::default();
    let service = fabric.join(JoinRequest::new(LOCALHOST));
    let config = ManagementConfig {
        connector: ConnectorConfig {
            managed_nodes: ManagedNodes::All,
            connector_host: "not-an-address".to_string(),
            ..ConnectorConfig::default()
        },
        ..ManagementConfig::default()
    };
    let management = Management::new(config, service).unwrap();

    let err = management.start().unwrap_err();
    assert_eq!(err.category(), "security");
    let reason = management.connector().start_failure().unwrap();
    assert!(reason.contains("not-an-address"));
    assert!(!reason.contains('\n'));
    assert_eq!(management.state(), ConnectorState::Stopped);

    let again = management.start().unwrap_err();
    assert_eq!(again.category(), "security");
    assert_eq!(management.connector().start_failure(), Some(reason));
}

struct ReadinessCheck {
    ready: AtomicBool,
}

impl HealthCheck for ReadinessCheck {
    fn name(&self) -> String {
        "readiness".to_string()
    }

    fn is_live(&self) -> bool {
        true
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn is_safe(&self) -> bool {
        true
    }

    fn is_started(&self) -> bool {
        true
    }
}

#[test_log::test(tokio::test)]
async fn test_health_checks_are_federated() {
    let mut cluster = TestCluster::new();
    let manager = cluster
        .start_node(NodeSpec::new("manager").managed(ManagedNodes::All))
        .unwrap();
    let storage = cluster.start_node(NodeSpec::new("storage")).unwrap();
    let (manager, storage) = (cluster.node(manager), cluster.node(storage));

    // nothing registered yet
    assert!(!storage.management.all_health_checks_ready());

    let check = Arc::new(ReadinessCheck {
        ready: AtomicBool::new(false),
    });
    let name = storage.management.register_health_check(check.clone()).unwrap();
    assert!(name.starts_with("type=HealthCheck,subType=application,name=readiness"));
    assert!(storage.management.all_health_checks_live());
    assert!(!storage.management.all_health_checks_ready());

    check.ready.store(true, Ordering::SeqCst);
    assert!(storage.management.all_health_checks_ready());

    assert!(eventually(DEFAULT_WAIT, || manager.view_has(&name)).await);
    assert_eq!(
        manager.management.get_attribute(&name, "Live").await.unwrap(),
        Value::Bool(true)
    );
}
