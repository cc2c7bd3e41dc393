//! Remote model caching under the refresh policies.

use config::{ManagedNodes, RefreshPolicy};
use federation::ManagedObject;
use mgmt_e2e_tests::{counter_bean, eventually, NodeSpec, TestCluster, DEFAULT_WAIT};
use std::time::Duration;
use types::Value;

/// A manager with the given policy and one storage member owning a counter.
async fn cluster_with_counter(
    policy: RefreshPolicy,
    ttl_millis: u64,
) -> (TestCluster, String, std::sync::Arc<federation::SimpleBean>) {
    let mut cluster = TestCluster::new();
    let manager = cluster
        .start_node(
            NodeSpec::new("manager")
                .managed(ManagedNodes::All)
                .refresh(policy, ttl_millis),
        )
        .unwrap();
    let storage = cluster.start_node(NodeSpec::new("storage")).unwrap();

    let bean = counter_bean("Counter", 1);
    let name = cluster
        .node(storage)
        .management
        .register("type=Counter,name=requests", ManagedObject::Wrapper(bean.clone()))
        .unwrap();
    let manager = cluster.node(manager);
    assert!(eventually(DEFAULT_WAIT, || manager.view_has(&name)).await);
    (cluster, name, bean)
}

#[test_log::test(tokio::test)]
async fn test_on_query_readers_share_one_fetch() {
    let (cluster, name, _bean) = cluster_with_counter(RefreshPolicy::OnQuery, 100).await;
    let manager = cluster.node(0);
    let connector = manager.connector();

    tokio::time::sleep(Duration::from_millis(200)).await;
    connector.reset_statistics();

    let (first, second) = tokio::join!(
        manager.management.get_attribute(&name, "Count"),
        manager.management.get_attribute(&name, "Count"),
    );
    assert_eq!(first.unwrap(), Value::Long(1));
    assert_eq!(second.unwrap(), Value::Long(1));
    assert_eq!(connector.stats().snapshot().refresh_count, 1);
    assert!(!connector.remote_model(&name).unwrap().execute_mutex().is_executing());
}

#[test_log::test(tokio::test)]
async fn test_expired_snapshot_is_fetched_again() {
    let (cluster, name, bean) = cluster_with_counter(RefreshPolicy::Expired, 100).await;
    let manager = cluster.node(0);

    assert_eq!(
        manager.management.get_attribute(&name, "Count").await.unwrap(),
        Value::Long(1)
    );

    bean.update("Count", 5i64);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        manager.management.get_attribute(&name, "Count").await.unwrap(),
        Value::Long(5)
    );
    assert!(manager.connector().stats().snapshot().refresh_count >= 1);
}

#[test_log::test(tokio::test)]
async fn test_behind_serves_last_snapshot_and_refreshes_in_background() {
    let (cluster, name, bean) = cluster_with_counter(RefreshPolicy::Behind, 100).await;
    let manager = cluster.node(0);

    bean.update("Count", 9i64);
    tokio::time::sleep(Duration::from_millis(200)).await;

    // the expired read is answered from the cache and triggers a fetch
    assert_eq!(
        manager.management.get_attribute(&name, "Count").await.unwrap(),
        Value::Long(1)
    );
    let stats = manager.connector().stats().snapshot();
    assert_eq!(stats.refresh_count, 1);
    assert_eq!(stats.refresh_prediction_count, 1);

    let model = manager.connector().remote_model(&name).unwrap();
    assert!(
        eventually(DEFAULT_WAIT, || {
            model
                .latest_snapshot()
                .and_then(|s| s.attribute("Count").cloned())
                == Some(Value::Long(9))
        })
        .await
    );
}

#[test_log::test(tokio::test)]
async fn test_query_refreshes_matched_models() {
    let (cluster, name, _bean) = cluster_with_counter(RefreshPolicy::Ahead, 1000).await;
    let manager = cluster.node(0);
    manager.connector().reset_statistics();

    let names = manager
        .management
        .query_names("type=Counter,*", None)
        .await
        .unwrap();
    assert!(names.contains(&name));

    let stats = manager.connector().stats().snapshot();
    assert_eq!(stats.refresh_count, 1);
    assert_eq!(stats.refresh_prediction_count, 1);
    // nobody read the model before the refresh
    assert_eq!(stats.refresh_excess_count, 1);

    let report = manager.connector().report_remote_models();
    let entry = report.iter().find(|r| r.name == name).unwrap();
    assert_eq!(entry.owner, cluster.node(1).id());
    assert!(!entry.accessed);
}

#[test_log::test(tokio::test)]
async fn test_ahead_refreshes_other_active_models() {
    let (cluster, first, _first_bean) = cluster_with_counter(RefreshPolicy::Ahead, 100).await;
    let second_bean = counter_bean("Counter", 2);
    let second = cluster
        .node(1)
        .management
        .register("type=Counter,name=errors", ManagedObject::Wrapper(second_bean.clone()))
        .unwrap();
    let manager = cluster.node(0);
    assert!(eventually(DEFAULT_WAIT, || manager.view_has(&second)).await);

    // both models have been read once
    assert_eq!(
        manager.management.get_attribute(&first, "Count").await.unwrap(),
        Value::Long(1)
    );
    assert_eq!(
        manager.management.get_attribute(&second, "Count").await.unwrap(),
        Value::Long(2)
    );

    second_bean.update("Count", 12i64);
    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.connector().reset_statistics();

    // reading the first one refreshes it in place and the second ahead of time
    assert_eq!(
        manager.management.get_attribute(&first, "Count").await.unwrap(),
        Value::Long(1)
    );
    let stats = manager.connector().stats().snapshot();
    assert_eq!(stats.refresh_count, 1);
    assert_eq!(stats.refresh_prediction_count, 1);

    let model = manager.connector().remote_model(&second).unwrap();
    assert!(
        eventually(DEFAULT_WAIT, || {
            model
                .latest_snapshot()
                .and_then(|s| s.attribute("Count").cloned())
                == Some(Value::Long(12))
        })
        .await,
        "the second model was not refreshed ahead"
    );
}
