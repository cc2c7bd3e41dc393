//! Owner lookups, departures and dynamic re-arbitration of management.

use config::ManagedNodes;
use federation::ManagedObject;
use mgmt_e2e_tests::{counter_bean, eventually, eventually_async, NodeSpec, TestCluster, DEFAULT_WAIT};

#[test_log::test(tokio::test)]
async fn test_find_owner_uses_node_id_without_a_server() {
    let mut cluster = TestCluster::new();
    let a = cluster.start_node(NodeSpec::new("a")).unwrap();
    let b = cluster.start_node(NodeSpec::new("b")).unwrap();
    let (a, b) = (cluster.node(a), cluster.node(b));

    // nobody manages, so there is nobody to ask
    assert!(a.connector().remote_servers().is_empty());

    let name = format!("type=Cache,name=orders,nodeId={}", b.id());
    let owner = a.management.find_model_owner(&name).await.unwrap();
    assert_eq!(owner.map(|m| m.id), Some(b.id()));

    let missing = "type=Cache,name=orders,nodeId=4242";
    assert_eq!(a.management.find_model_owner(missing).await.unwrap(), None);

    // a name without an owner key and no server to ask
    assert_eq!(a.management.find_model_owner("type=Cluster").await.unwrap(), None);
}

#[test_log::test(tokio::test)]
async fn test_find_owner_of_a_local_name() {
    let mut cluster = TestCluster::new();
    let a = cluster.start_node(NodeSpec::new("a")).unwrap();
    let a = cluster.node(a);
    let name = a
        .management
        .register("type=Cache,name=orders", ManagedObject::Cache(counter_bean("Cache", 0)))
        .unwrap();

    let owner = a.management.find_model_owner(&name).await.unwrap();
    assert_eq!(owner.map(|m| m.id), Some(a.id()));
}

#[test_log::test(tokio::test)]
async fn test_find_owner_through_the_server_for_responsibility_names() {
    let mut cluster = TestCluster::new();
    let manager = cluster
        .start_node(NodeSpec::new("manager").managed(ManagedNodes::All))
        .unwrap();
    let owner = cluster.start_node(NodeSpec::new("owner")).unwrap();
    let client = cluster.start_node(NodeSpec::new("client")).unwrap();

    // responsibility beans carry no nodeId but are still federated
    let name = cluster
        .node(owner)
        .management
        .register(
            "type=Service,name=DistributedCache,responsibility=ServiceCoordinator",
            ManagedObject::Service(counter_bean("Service", 3)),
        )
        .unwrap();
    assert!(!name.contains("nodeId="));

    let (manager, owner, client) = (cluster.node(manager), cluster.node(owner), cluster.node(client));
    assert!(eventually(DEFAULT_WAIT, || manager.view_has(&name)).await);
    assert!(eventually(DEFAULT_WAIT, || client.knows_server(manager)).await);

    let found = client.management.find_model_owner(&name).await.unwrap();
    assert_eq!(found.map(|m| m.id), Some(owner.id()));
}

#[test_log::test(tokio::test)]
async fn test_departed_owner_is_never_reported() {
    let mut cluster = TestCluster::new();
    let manager = cluster
        .start_node(NodeSpec::new("manager").managed(ManagedNodes::All))
        .unwrap();
    let storage = cluster.start_node(NodeSpec::new("storage")).unwrap();
    let name = cluster
        .node(storage)
        .management
        .register("type=Cache,name=orders", ManagedObject::Cache(counter_bean("Cache", 7)))
        .unwrap();

    {
        let manager = cluster.node(manager);
        assert!(eventually(DEFAULT_WAIT, || manager.view_has(&name)).await);
        assert_eq!(
            manager.management.get_attribute(&name, "Count").await.unwrap(),
            types::Value::Long(7)
        );
    }

    cluster.stop_node(storage);

    let manager = cluster.node(manager);
    assert!(
        eventually(DEFAULT_WAIT, || {
            !manager.view_has(&name) && manager.connector().remote_model(&name).is_none()
        })
        .await,
        "models of the departed member were not purged"
    );
    assert_eq!(manager.management.find_model_owner(&name).await.unwrap(), None);
    assert!(manager.management.get_attribute(&name, "Count").await.is_err());
}

#[test_log::test(tokio::test)]
async fn test_next_dynamic_senior_takes_over() {
    let mut cluster = TestCluster::new();
    let first = cluster
        .start_node(NodeSpec::new("first").managed(ManagedNodes::Dynamic))
        .unwrap();
    let second = cluster
        .start_node(NodeSpec::new("second").managed(ManagedNodes::Dynamic))
        .unwrap();
    let storage = cluster.start_node(NodeSpec::new("storage")).unwrap();
    let name = cluster
        .node(storage)
        .management
        .register("type=Cache,name=orders", ManagedObject::Cache(counter_bean("Cache", 1)))
        .unwrap();

    {
        let (first, second) = (cluster.node(first), cluster.node(second));
        assert!(first.connector().is_managing());
        assert!(!second.connector().is_managing());
        assert!(eventually(DEFAULT_WAIT, || first.view_has(&name)).await);
        assert!(
            eventually(DEFAULT_WAIT, || second.connector().published_endpoint().url.is_some())
                .await
        );
    }

    cluster.stop_node(first);

    let (first_id, second, storage) = (
        cluster.node(first).id(),
        cluster.node(second),
        cluster.node(storage),
    );
    assert!(
        eventually(DEFAULT_WAIT, || second.connector().is_managing()).await,
        "second member never assumed management"
    );
    assert!(
        eventually(DEFAULT_WAIT, || second.view_has(&name)).await,
        "storage did not push its registry to the new manager"
    );
    assert!(eventually(DEFAULT_WAIT, || storage.knows_server(second)).await);
    assert!(!storage.connector().is_remote_server(first_id));

    let (name_ref, storage_id) = (name.as_str(), storage.id());
    assert!(
        eventually_async(DEFAULT_WAIT, || async move {
            matches!(
                second.management.find_model_owner(name_ref).await,
                Ok(Some(member)) if member.id == storage_id
            )
        })
        .await
    );
    assert_eq!(
        second.management.get_attribute(&name, "Count").await.unwrap(),
        types::Value::Long(1)
    );
}
