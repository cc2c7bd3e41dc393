//! Handshake between members: announcements, registry pushes and the
//! management servers each member ends up knowing.

use config::ManagedNodes;
use federation::{ConnectorState, ManagedObject};
use mgmt_e2e_tests::{counter_bean, eventually, NodeSpec, TestCluster, DEFAULT_WAIT};

#[test_log::test(tokio::test)]
async fn test_single_member_announces_immediately() {
    let mut cluster = TestCluster::new();
    let a = cluster
        .start_node(NodeSpec::new("a").managed(ManagedNodes::All))
        .unwrap();
    let a = cluster.node(a);

    assert!(a.connector().is_announced());
    assert_eq!(a.management.state(), ConnectorState::Announced);
    assert!(a.connector().is_managing());
    assert!(a.connector().remote_servers().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_registry_reaches_every_server_after_announce() {
    let mut cluster = TestCluster::new();
    let manager = cluster
        .start_node(NodeSpec::new("manager").managed(ManagedNodes::All))
        .unwrap();
    let storage = cluster.start_node(NodeSpec::new("storage")).unwrap();

    // registered right after start, possibly before the announcement completed
    let names: Vec<String> = ["orders", "customers", "invoices"]
        .iter()
        .map(|cache| {
            cluster
                .node(storage)
                .management
                .register(
                    &format!("type=Cache,name={}", cache),
                    ManagedObject::Cache(counter_bean("Cache", 0)),
                )
                .unwrap()
        })
        .collect();

    let storage_node = cluster.node(storage);
    let manager_node = cluster.node(manager);
    assert!(eventually(DEFAULT_WAIT, || storage_node.connector().is_announced()).await);
    assert!(storage_node.knows_server(manager_node));
    assert!(
        eventually(DEFAULT_WAIT, || names.iter().all(|n| manager_node.view_has(n))).await,
        "manager never saw every registration"
    );

    // a registration after the announcement is pushed on its own
    let late = storage_node
        .management
        .register("type=Cache,name=late", ManagedObject::Cache(counter_bean("Cache", 0)))
        .unwrap();
    assert!(eventually(DEFAULT_WAIT, || manager_node.view_has(&late)).await);

    for name in names.iter().chain(std::iter::once(&late)) {
        let owner = manager_node.connector().remote_model(name).unwrap().owner();
        assert_eq!(owner.id, storage_node.id());
    }
}

#[test_log::test(tokio::test)]
async fn test_dynamic_senior_with_plain_and_late_managing_members() {
    let mut cluster = TestCluster::new();
    let a = cluster
        .start_node(NodeSpec::new("a").managed(ManagedNodes::Dynamic))
        .unwrap();
    let a_bean = cluster
        .node(a)
        .management
        .register("type=Service,name=Invocation", ManagedObject::Service(counter_bean("Service", 1)))
        .unwrap();
    assert!(cluster.node(a).connector().is_managing());

    let b = cluster.start_node(NodeSpec::new("b")).unwrap();
    let b_cache = cluster
        .node(b)
        .management
        .register("type=Cache,name=orders", ManagedObject::Cache(counter_bean("Cache", 2)))
        .unwrap();
    assert!(eventually(DEFAULT_WAIT, || cluster.node(b).connector().is_announced()).await);

    let c = cluster
        .start_node(NodeSpec::new("c").managed(ManagedNodes::All))
        .unwrap();
    let c_cache = cluster
        .node(c)
        .management
        .register("type=Cache,name=customers", ManagedObject::Cache(counter_bean("Cache", 3)))
        .unwrap();

    let (a, b, c) = (cluster.node(a), cluster.node(b), cluster.node(c));
    assert!(eventually(DEFAULT_WAIT, || c.connector().is_announced()).await);

    // b is not managing, so nobody records it as a server
    assert!(!b.connector().is_managing());
    assert!(!a.knows_server(b));
    assert!(!c.knows_server(b));

    // both learned c from its announcement, c learned a from the replies
    assert!(eventually(DEFAULT_WAIT, || a.knows_server(c) && b.knows_server(c)).await);
    assert!(b.knows_server(a));
    assert!(c.knows_server(a));

    // every global bean is visible on both managing members
    for name in [&a_bean, &b_cache, &c_cache] {
        assert!(
            eventually(DEFAULT_WAIT, || a.view_has(name) && c.view_has(name)).await,
            "{} missing from a managing view",
            name
        );
    }
    assert!(b.connector().view().is_none());
}

#[test_log::test(tokio::test)]
async fn test_unregister_is_federated() {
    let mut cluster = TestCluster::new();
    let manager = cluster
        .start_node(NodeSpec::new("manager").managed(ManagedNodes::All))
        .unwrap();
    let storage = cluster.start_node(NodeSpec::new("storage")).unwrap();
    let (manager, storage) = (cluster.node(manager), cluster.node(storage));
    assert!(eventually(DEFAULT_WAIT, || storage.connector().is_announced()).await);

    let first = storage
        .management
        .register("type=Cache,name=a", ManagedObject::Cache(counter_bean("Cache", 0)))
        .unwrap();
    let second = storage
        .management
        .register("type=Cache,name=b", ManagedObject::Cache(counter_bean("Cache", 0)))
        .unwrap();
    let other = storage
        .management
        .register("type=Service,name=s", ManagedObject::Service(counter_bean("Service", 0)))
        .unwrap();
    assert!(
        eventually(DEFAULT_WAIT, || {
            manager.view_has(&first) && manager.view_has(&second) && manager.view_has(&other)
        })
        .await
    );

    let removed = storage.management.unregister("type=Cache,*");
    assert_eq!(removed, vec![first.clone(), second.clone()]);
    assert!(
        eventually(DEFAULT_WAIT, || !manager.view_has(&first) && !manager.view_has(&second))
            .await
    );
    assert!(manager.view_has(&other));
    assert!(manager.connector().remote_model(&first).is_none());
}
