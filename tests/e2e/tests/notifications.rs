//! Listener subscriptions relayed between members.

use bytes::Bytes;
use codec::{Subscribe, SubscriptionChange, Task, TaskResponse};
use config::ManagedNodes;
use federation::{ManagedObject, NotificationListener};
use mgmt_e2e_tests::{counter_bean, eventually, NodeSpec, RecordingListener, TestCluster, DEFAULT_WAIT};
use network::InvocationService;
use std::sync::Arc;
use types::{NotificationFilter, RemoteHolder, Value};

async fn manager_and_owner() -> (TestCluster, String) {
    let mut cluster = TestCluster::new();
    let manager = cluster
        .start_node(NodeSpec::new("manager").managed(ManagedNodes::All))
        .unwrap();
    let owner = cluster.start_node(NodeSpec::new("owner")).unwrap();
    let name = cluster
        .node(owner)
        .management
        .register("type=Cache,name=orders", ManagedObject::Cache(counter_bean("Cache", 0)))
        .unwrap();
    let manager = cluster.node(manager);
    assert!(eventually(DEFAULT_WAIT, || manager.view_has(&name)).await);
    (cluster, name)
}

#[test_log::test(tokio::test)]
async fn test_owner_notifications_reach_remote_listener() {
    let (cluster, name) = manager_and_owner().await;
    let (manager, owner) = (cluster.node(0), cluster.node(1));

    let recorder = RecordingListener::new();
    let listener: Arc<dyn NotificationListener> = recorder.clone();
    manager
        .management
        .add_notification_listener(&name, listener.clone(), None, Some(Value::from("handback")))
        .await
        .unwrap();

    assert!(
        eventually(DEFAULT_WAIT, || {
            owner
                .connector()
                .report_subscriptions()
                .iter()
                .any(|s| s.name == name && s.subscribers == vec![manager.id()])
        })
        .await,
        "owner never recorded the subscription"
    );
    assert!(owner.gateway().is_subscribed_to(&name));

    owner.gateway().trigger(&name, "cache.evicted", "entry evicted").unwrap();
    assert!(eventually(DEFAULT_WAIT, || recorder.count() == 1).await);

    let (notification, handback) = recorder.received().remove(0);
    assert_eq!(notification.kind, "cache.evicted");
    assert_eq!(notification.source, name);
    assert_eq!(handback, Some(Value::from("handback")));
    assert!(manager.connector().stats().snapshot().notification_count >= 1);

    let removed = manager
        .management
        .remove_notification_listener(&name, &listener, None)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(
        eventually(DEFAULT_WAIT, || owner.connector().report_subscriptions().is_empty()).await
    );
    assert!(manager
        .management
        .remove_notification_listener(&name, &listener, None)
        .await
        .is_err());
}

#[test_log::test(tokio::test)]
async fn test_filter_is_applied_on_the_owner() {
    let (cluster, name) = manager_and_owner().await;
    let (manager, owner) = (cluster.node(0), cluster.node(1));

    let recorder = RecordingListener::new();
    manager
        .management
        .add_notification_listener(
            &name,
            recorder.clone(),
            Some(NotificationFilter::TypePrefix("cache.".to_string())),
            None,
        )
        .await
        .unwrap();
    assert!(eventually(DEFAULT_WAIT, || owner.gateway().is_subscribed_to(&name)).await);

    owner.gateway().trigger(&name, "service.restarted", "ignored").unwrap();
    owner.gateway().trigger(&name, "cache.cleared", "delivered").unwrap();

    assert!(eventually(DEFAULT_WAIT, || recorder.count() >= 1).await);
    let received = recorder.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0.kind, "cache.cleared");
}

#[test_log::test(tokio::test)]
async fn test_subscribe_to_unregistered_model_is_ignored() {
    let (cluster, name) = manager_and_owner().await;
    let (manager, owner) = (cluster.node(0), cluster.node(1));

    owner.management.unregister(&name);
    assert!(owner.connector().local_model(&name).is_none());

    let task = Subscribe {
        member_from: manager.id(),
        name: name.clone(),
        change: SubscriptionChange::Add(RemoteHolder::new(77, manager.id(), None)),
    };
    let payload: Bytes = Task::from(task).encode().unwrap();
    let replies = manager.service.query(payload, &[owner.id()]).await.unwrap();

    let reply = replies.get(&owner.id()).expect("owner replied");
    assert_eq!(TaskResponse::decode(reply).unwrap(), TaskResponse::Ack);
    assert!(owner.connector().report_subscriptions().is_empty());
    assert!(!owner.gateway().is_subscribed_to(&name));
}

#[test_log::test(tokio::test)]
async fn test_listener_on_departed_owner_is_rejected() {
    let (cluster, name) = manager_and_owner().await;
    cluster.stop_node(1);
    let manager = cluster.node(0);
    assert!(eventually(DEFAULT_WAIT, || !manager.view_has(&name)).await);

    let err = manager
        .management
        .add_notification_listener(&name, RecordingListener::new(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.category(), "illegal_argument");
}
