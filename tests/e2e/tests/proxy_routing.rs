//! Client requests on a member that does not manage, routed to a managing
//! member with `InvokeRemote`.

use async_trait::async_trait;
use bytes::Bytes;
use config::ManagedNodes;
use federation::ManagedObject;
use mgmt_e2e_tests::{counter_bean, eventually, NodeSpec, TestCluster, DEFAULT_WAIT};
use network::{Continuation, DeliveryContext, InvocationService, TaskHandler, TaskReply};
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use types::{ManagementFunction, ProductVersion, Value};

/// manager, storage owning a counter, and a client that manages nothing.
async fn three_members(
    manager_version: ProductVersion,
) -> (TestCluster, String, std::sync::Arc<federation::SimpleBean>) {
    let mut cluster = TestCluster::new();
    let manager = cluster
        .start_node(
            NodeSpec::new("manager")
                .managed(ManagedNodes::All)
                .version(manager_version),
        )
        .unwrap();
    let storage = cluster.start_node(NodeSpec::new("storage")).unwrap();
    let client = cluster.start_node(NodeSpec::new("client")).unwrap();

    let bean = counter_bean("Counter", 4);
    let name = cluster
        .node(storage)
        .management
        .register("type=Counter,name=requests", ManagedObject::Wrapper(bean.clone()))
        .unwrap();

    let (manager, client) = (cluster.node(manager), cluster.node(client));
    assert!(eventually(DEFAULT_WAIT, || manager.view_has(&name)).await);
    assert!(eventually(DEFAULT_WAIT, || client.knows_server(manager)).await);
    (cluster, name, bean)
}

#[test_log::test(tokio::test)]
async fn test_client_reads_and_writes_through_the_manager() {
    let (cluster, name, bean) = three_members(ProductVersion::CURRENT).await;
    let client = &cluster.node(2).management;

    assert_eq!(client.get_attribute(&name, "Count").await.unwrap(), Value::Long(4));

    let attributes = client.get_attributes(&name, None).await.unwrap();
    assert_eq!(attributes.get("Count"), Some(&Value::Long(4)));
    assert_eq!(attributes.get("Limit"), Some(&Value::Long(10)));

    client.set_attribute(&name, "Limit", Value::Long(20)).await.unwrap();
    assert_eq!(bean.value("Limit"), Some(Value::Long(20)));

    let sum = client
        .invoke(&name, "add", vec![Value::Long(2), Value::Long(3)], vec![])
        .await
        .unwrap();
    assert_eq!(sum, Value::Long(5));

    assert!(client.is_mbean_registered(&name).await.unwrap());
    assert!(!client
        .is_mbean_registered("type=Counter,name=missing,nodeId=2")
        .await
        .unwrap());

    let info = client.mbean_info(&name).await.unwrap();
    assert!(info.attributes.contains(&"Count".to_string()));
}

#[test_log::test(tokio::test)]
async fn test_client_queries_and_functions_run_on_the_manager() {
    let (cluster, name, _bean) = three_members(ProductVersion::CURRENT).await;
    let client = &cluster.node(2).management;

    let local = client
        .register("type=Counter,name=local", ManagedObject::Wrapper(counter_bean("Counter", 0)))
        .unwrap();
    let manager = cluster.node(0);
    assert!(eventually(DEFAULT_WAIT, || manager.view_has(&local)).await);

    let names = client.query_names("type=Counter,*", None).await.unwrap();
    assert!(names.contains(&name));
    assert!(names.contains(&local));

    let count = client
        .execute(ManagementFunction::CountModels {
            pattern: "type=Counter,*".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(count, Value::Long(2));

    let collected = client
        .execute(ManagementFunction::CollectAttribute {
            pattern: "type=Counter,*".to_string(),
            attribute: "Count".to_string(),
        })
        .await
        .unwrap();
    match collected {
        Value::Map(values) => {
            assert_eq!(values.get(&name), Some(&Value::Long(4)));
            assert_eq!(values.get(&local), Some(&Value::Long(0)));
        }
        other => panic!("unexpected function result {:?}", other),
    }
}

#[test_log::test(tokio::test)]
async fn test_owner_failures_reach_the_client() {
    let (cluster, name, _bean) = three_members(ProductVersion::CURRENT).await;
    let client = &cluster.node(2).management;

    let err = client.get_attribute(&name, "Missing").await.unwrap_err();
    assert_eq!(err.category(), "illegal_argument");

    let err = client
        .invoke(&name, "add", vec![Value::Text("x".into())], vec![])
        .await
        .unwrap_err();
    assert_eq!(err.category(), "illegal_argument");

    let err = client
        .set_attribute(&name, "Count", Value::Long(1))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "illegal_argument");
}

#[test_log::test(tokio::test)]
async fn test_actions_an_old_manager_cannot_decode_are_refused() {
    let old = ProductVersion::new(12, 2, 1, 0, 0);
    let (cluster, name, _bean) = three_members(old).await;
    let client = &cluster.node(2).management;

    // plain reads predate the version gates
    assert_eq!(client.get_attribute(&name, "Count").await.unwrap(), Value::Long(4));

    let err = client.query_names("type=Counter,*", None).await.unwrap_err();
    assert_eq!(err.category(), "unsupported_operation");

    let err = client
        .execute(ManagementFunction::CountModels {
            pattern: "*".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.category(), "unsupported_operation");
}

/// Accepts every task and never answers.
#[derive(Default)]
struct Stalled {
    pending: Mutex<Vec<Continuation>>,
}

#[async_trait]
impl TaskHandler for Stalled {
    async fn handle(&self, _ctx: DeliveryContext, _payload: Bytes) -> TaskReply {
        let (continuation, reply) = Continuation::new();
        self.pending.lock().push(continuation);
        reply
    }
}

#[test_log::test(tokio::test)]
async fn test_timed_out_manager_is_skipped() {
    let mut cluster = TestCluster::new();
    let first = cluster
        .start_node(NodeSpec::new("manager-a").managed(ManagedNodes::All))
        .unwrap();
    let second = cluster
        .start_node(NodeSpec::new("manager-b").managed(ManagedNodes::All))
        .unwrap();
    let storage = cluster.start_node(NodeSpec::new("storage")).unwrap();
    let client = cluster.start_node(NodeSpec::new("client")).unwrap();
    let name = cluster
        .node(storage)
        .management
        .register(
            "type=Counter,name=requests",
            ManagedObject::Wrapper(counter_bean("Counter", 4)),
        )
        .unwrap();

    let (first, second, client) = (
        cluster.node(first),
        cluster.node(second),
        cluster.node(client),
    );
    assert!(eventually(DEFAULT_WAIT, || second.view_has(&name)).await);
    assert!(
        eventually(DEFAULT_WAIT, || {
            client.knows_server(first) && client.knows_server(second)
        })
        .await
    );
    assert!(first.id() < second.id());

    // the lowest member is chosen first; it stops answering but stays in the cluster
    first.service.set_task_handler(Arc::new(Stalled::default()));

    assert_eq!(
        client.management.get_attribute(&name, "Count").await.unwrap(),
        Value::Long(4)
    );
    assert!(cluster.fabric().metrics().timeouts.load(Ordering::Relaxed) >= 1);
    assert!(client.knows_server(first), "a timeout must not forget the server");
}
