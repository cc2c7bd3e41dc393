//! Managed objects handed to the gateway.
//!
//! A bean exposes named attributes and operations. What kind of model the
//! gateway builds for it is decided by the [`ManagedObject`] variant it is
//! wrapped in, a closed set matched exhaustively when the model is created.

use crate::error::{ManagementError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use types::{ModelKind, Value};

/// Attribute and operation surface of a managed bean.
pub trait ManagedBean: Send + Sync {
    fn class_name(&self) -> &str;

    fn description(&self) -> String {
        String::new()
    }

    /// Current values of every readable attribute
    fn attributes(&self) -> BTreeMap<String, Value>;

    fn set_attribute(&self, name: &str, _value: Value) -> Result<()> {
        Err(ManagementError::illegal_argument(format!(
            "Attribute \"{}\" of {} is not writable",
            name,
            self.class_name()
        )))
    }

    fn invoke(&self, operation: &str, _params: &[Value]) -> Result<Value> {
        Err(ManagementError::unsupported(format!(
            "Operation \"{}\" is not supported by {}",
            operation,
            self.class_name()
        )))
    }

    fn operations(&self) -> Vec<String> {
        Vec::new()
    }

    /// Health capability, registered alongside the bean
    fn health_check(&self) -> Option<Arc<dyn HealthCheck>> {
        None
    }
}

/// Liveness, readiness, safety and startup state of one component.
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> String;

    fn is_live(&self) -> bool;

    fn is_ready(&self) -> bool;

    fn is_safe(&self) -> bool;

    fn is_started(&self) -> bool;

    /// Only member checks take part in the member-wide aggregate
    fn is_member_health_check(&self) -> bool {
        true
    }
}

/// A bean tagged with the capability it provides.
#[derive(Clone)]
pub enum ManagedObject {
    Cluster(Arc<dyn ManagedBean>),
    ClusterNode(Arc<dyn ManagedBean>),
    Service(Arc<dyn ManagedBean>),
    Cache(Arc<dyn ManagedBean>),
    ConnectionManager(Arc<dyn ManagedBean>),
    Connection(Arc<dyn ManagedBean>),
    StorageManager(Arc<dyn ManagedBean>),
    PointToPoint(Arc<dyn ManagedBean>),
    Reporter(Arc<dyn ManagedBean>),
    Management(Arc<dyn ManagedBean>),
    HealthCheck(Arc<dyn HealthCheck>),
    /// A bean registered elsewhere and only referenced here
    Reference(Arc<dyn ManagedBean>),
    /// Anything else
    Wrapper(Arc<dyn ManagedBean>),
}

impl ManagedObject {
    pub fn kind(&self) -> ModelKind {
        match self {
            ManagedObject::Cluster(_) => ModelKind::Cluster,
            ManagedObject::ClusterNode(_) => ModelKind::ClusterNode,
            ManagedObject::Service(_) => ModelKind::Service,
            ManagedObject::Cache(_) => ModelKind::Cache,
            ManagedObject::ConnectionManager(_) => ModelKind::ConnectionManager,
            ManagedObject::Connection(_) => ModelKind::Connection,
            ManagedObject::StorageManager(_) => ModelKind::StorageManager,
            ManagedObject::PointToPoint(_) => ModelKind::PointToPoint,
            ManagedObject::Reporter(_) => ModelKind::Reporter,
            ManagedObject::Management(_) => ModelKind::Management,
            ManagedObject::HealthCheck(_) => ModelKind::HealthCheck,
            ManagedObject::Reference(_) => ModelKind::JmxReference,
            ManagedObject::Wrapper(_) => ModelKind::Wrapper,
        }
    }

    /// Split into the model kind and the bean backing it.
    pub fn into_parts(self) -> (ModelKind, Arc<dyn ManagedBean>) {
        let kind = self.kind();
        let bean = match self {
            ManagedObject::Cluster(bean)
            | ManagedObject::ClusterNode(bean)
            | ManagedObject::Service(bean)
            | ManagedObject::Cache(bean)
            | ManagedObject::ConnectionManager(bean)
            | ManagedObject::Connection(bean)
            | ManagedObject::StorageManager(bean)
            | ManagedObject::PointToPoint(bean)
            | ManagedObject::Reporter(bean)
            | ManagedObject::Management(bean)
            | ManagedObject::Reference(bean)
            | ManagedObject::Wrapper(bean) => bean,
            ManagedObject::HealthCheck(check) => {
                Arc::new(crate::health::HealthCheckBean::application(check)) as Arc<dyn ManagedBean>
            }
        };
        (kind, bean)
    }
}

impl fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManagedObject({})", self.kind())
    }
}

type Operation = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Map-backed bean used for custom beans, tests and the demo node.
pub struct SimpleBean {
    class_name: String,
    description: String,
    values: RwLock<BTreeMap<String, Value>>,
    writable: BTreeSet<String>,
    operations: HashMap<String, Operation>,
    health: Option<Arc<dyn HealthCheck>>,
}

impl SimpleBean {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            description: String::new(),
            values: RwLock::new(BTreeMap::new()),
            writable: BTreeSet::new(),
            operations: HashMap::new(),
            health: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_attribute(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.write().insert(name.into(), value.into());
        self
    }

    /// Attribute that clients may set
    pub fn with_writable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        self.writable.insert(name.clone());
        self.with_attribute(name, value)
    }

    pub fn with_operation<F>(mut self, name: impl Into<String>, op: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.operations.insert(name.into(), Arc::new(op));
        self
    }

    pub fn with_health_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.health = Some(check);
        self
    }

    /// Update a value from the owning component's side.
    pub fn update(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.write().insert(name.into(), value.into());
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        self.values.read().get(name).cloned()
    }
}

impl ManagedBean for SimpleBean {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn attributes(&self) -> BTreeMap<String, Value> {
        self.values.read().clone()
    }

    fn set_attribute(&self, name: &str, value: Value) -> Result<()> {
        if !self.writable.contains(name) {
            return Err(ManagementError::illegal_argument(format!(
                "Attribute \"{}\" of {} is not writable",
                name, self.class_name
            )));
        }
        self.values.write().insert(name.to_string(), value);
        Ok(())
    }

    fn invoke(&self, operation: &str, params: &[Value]) -> Result<Value> {
        match self.operations.get(operation) {
            Some(op) => op(params),
            None => Err(ManagementError::unsupported(format!(
                "Operation \"{}\" is not supported by {}",
                operation, self.class_name
            ))),
        }
    }

    fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.operations.keys().cloned().collect();
        names.sort();
        names
    }

    fn health_check(&self) -> Option<Arc<dyn HealthCheck>> {
        self.health.clone()
    }
}
