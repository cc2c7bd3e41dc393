use super::{filter_attributes, Model, ModelBase};
use crate::bean::{HealthCheck, ManagedBean, ManagedObject};
use crate::error::{ManagementError, Result};
use crate::notification::{NotificationRelay, RemoteNotificationHandler};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use types::{names, Filter, MBeanInfo, MemberId, ModelKind, ModelSnapshot, Notification, RemoteHolder, Value};

/// Model of a bean that lives on this member.
pub struct LocalModel {
    base: ModelBase,
    kind: ModelKind,
    bean: Arc<dyn ManagedBean>,
    read_only: bool,
    health_name: RwLock<Option<String>>,
    remote: OnceCell<RemoteNotificationHandler>,
    sequence: AtomicU64,
}

impl LocalModel {
    pub fn new(name: impl Into<String>, object: ManagedObject, read_only: bool) -> Self {
        let (kind, bean) = object.into_parts();
        Self::from_parts(name, kind, bean, read_only)
    }

    pub fn from_parts(
        name: impl Into<String>,
        kind: ModelKind,
        bean: Arc<dyn ManagedBean>,
        read_only: bool,
    ) -> Self {
        Self {
            base: ModelBase::new(name),
            kind,
            bean,
            read_only,
            health_name: RwLock::new(None),
            remote: OnceCell::new(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn bean(&self) -> &Arc<dyn ManagedBean> {
        &self.bean
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_responsibility(&self) -> bool {
        names::is_responsibility(self.base.name())
    }

    pub fn health_check(&self) -> Option<Arc<dyn HealthCheck>> {
        self.bean.health_check()
    }

    /// Name of the health entry registered next to this model.
    pub fn health_model_name(&self) -> Option<String> {
        self.health_name.read().clone()
    }

    pub fn set_health_model_name(&self, name: Option<String>) {
        *self.health_name.write() = name;
    }

    /// Current attribute values, unstamped.
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            name: self.base.name().to_string(),
            kind: self.kind,
            read_only: self.read_only,
            attributes: self.bean.attributes(),
        }
    }

    pub fn get_attribute(&self, attribute: &str) -> Result<Value> {
        self.bean
            .attributes()
            .remove(attribute)
            .ok_or_else(|| ManagementError::unknown_attribute(attribute, self.base.name()))
    }

    pub fn get_attributes(&self, filter: Option<&Filter>) -> BTreeMap<String, Value> {
        filter_attributes(self.bean.attributes(), filter)
    }

    pub fn set_attribute(&self, attribute: &str, value: Value) -> Result<()> {
        if self.read_only {
            return Err(ManagementError::read_only(self.base.name()));
        }
        if !self.bean.attributes().contains_key(attribute) {
            return Err(ManagementError::unknown_attribute(attribute, self.base.name()));
        }
        self.bean.set_attribute(attribute, value)
    }

    pub fn invoke(&self, operation: &str, params: &[Value]) -> Result<Value> {
        if self.read_only {
            return Err(ManagementError::read_only(self.base.name()));
        }
        self.bean.invoke(operation, params)
    }

    pub fn mbean_info(&self) -> MBeanInfo {
        MBeanInfo {
            class_name: self.bean.class_name().to_string(),
            description: self.bean.description(),
            attributes: self.bean.attributes().into_keys().collect(),
            operations: self.bean.operations(),
        }
    }

    /// Build the next notification of this model and dispatch it.
    pub fn emit(&self, kind: &str, message: &str) -> Notification {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let notification = Notification::new(kind, self.base.name(), sequence, message);
        self.dispatch(&notification);
        notification
    }

    /// Deliver to local listeners and relay to subscribed members.
    pub fn dispatch(&self, notification: &Notification) -> usize {
        let local = self.handle_notification(notification);
        let remote = self
            .remote
            .get()
            .map_or(0, |handler| handler.dispatch(self.base.name(), notification));
        local + remote
    }

    /// Record a subscription from another member.
    pub fn add_remote_listener<F>(&self, holder: RemoteHolder, relay: F)
    where
        F: FnOnce() -> Arc<dyn NotificationRelay>,
    {
        self.remote
            .get_or_init(|| RemoteNotificationHandler::new(relay()))
            .add(holder);
    }

    pub fn remove_remote_listeners(&self, member_id: MemberId, holder_ids: &[i64]) -> usize {
        self.remote
            .get()
            .map_or(0, |handler| handler.remove(member_id, holder_ids))
    }

    pub fn unsubscribe_member(&self, member_id: MemberId) -> usize {
        self.remote
            .get()
            .map_or(0, |handler| handler.unsubscribe_member(member_id))
    }

    pub fn clear_remote_listeners(&self) {
        if let Some(handler) = self.remote.get() {
            handler.clear();
        }
    }

    pub fn remote_subscribers(&self) -> Vec<RemoteHolder> {
        self.remote
            .get()
            .map(RemoteNotificationHandler::holders)
            .unwrap_or_default()
    }

    pub fn is_subscribed_to(&self) -> bool {
        self.has_local_listeners() || self.remote.get().map_or(false, |h| !h.is_empty())
    }
}

impl Model for LocalModel {
    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn kind(&self) -> ModelKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::SimpleBean;
    use crate::notification::{ListenerHolder, NotificationListener};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Relay {
        sent: Mutex<Vec<Vec<MemberId>>>,
    }

    impl NotificationRelay for Relay {
        fn relay(&self, _name: &str, _notification: &Notification, members: &[MemberId]) {
            self.sent.lock().push(members.to_vec());
        }
    }

    struct Counter(Mutex<u32>);

    impl NotificationListener for Counter {
        fn handle_notification(&self, _notification: &Notification, _handback: Option<&Value>) {
            *self.0.lock() += 1;
        }
    }

    fn cache_model(read_only: bool) -> LocalModel {
        let bean = SimpleBean::new("CacheMBean")
            .with_attribute("Size", 3i64)
            .with_writable("HighUnits", 10i64);
        LocalModel::new(
            "type=Cache,name=orders,nodeId=1",
            ManagedObject::Cache(Arc::new(bean)),
            read_only,
        )
    }

    #[test]
    fn test_attribute_access() {
        let model = cache_model(false);
        assert_eq!(model.get_attribute("Size").unwrap(), Value::Long(3));
        assert!(matches!(
            model.get_attribute("Missing"),
            Err(ManagementError::IllegalArgument { .. })
        ));

        model.set_attribute("HighUnits", Value::Long(20)).unwrap();
        assert_eq!(model.snapshot().attribute("HighUnits"), Some(&Value::Long(20)));

        let only_size = model.get_attributes(Some(&Filter::names(["Size"])));
        assert_eq!(only_size.len(), 1);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let model = cache_model(true);
        let err = model.set_attribute("HighUnits", Value::Long(1)).unwrap_err();
        assert_eq!(err.to_string(), "MBean type=Cache,name=orders,nodeId=1 is read-only");
        assert!(model.invoke("reset", &[]).is_err());
        assert!(model.snapshot().read_only);
    }

    #[test]
    fn test_emit_reaches_local_and_remote() {
        let model = cache_model(false);
        let counter = Arc::new(Counter(Mutex::new(0)));
        let listener: Arc<dyn NotificationListener> = counter.clone();
        model.base().ensure_handler().add(ListenerHolder::new(listener, None, None));

        let relay = Arc::new(Relay::default());
        let shared = relay.clone();
        model.add_remote_listener(RemoteHolder::new(7, 2, None), move || shared);
        assert!(model.is_subscribed_to());

        let first = model.emit("cache.evicted", "gone");
        let second = model.emit("cache.evicted", "gone again");
        assert_eq!(first.sequence + 1, second.sequence);
        assert_eq!(*counter.0.lock(), 2);
        assert_eq!(relay.sent.lock().len(), 2);

        assert_eq!(model.unsubscribe_member(2), 1);
        assert!(model.remote_subscribers().is_empty());
    }
}
