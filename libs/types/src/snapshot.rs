//! Point-in-time copies of local model state shipped to managing members.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute stamped on every snapshot when a caching member stores it
pub const REFRESH_TIME_ATTRIBUTE: &str = "RefreshTime";

/// The closed set of managed object kinds a local model can wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    Cluster,
    ClusterNode,
    Service,
    Cache,
    ConnectionManager,
    Connection,
    StorageManager,
    PointToPoint,
    Reporter,
    Management,
    HealthCheck,
    JmxReference,
    Wrapper,
}

impl ModelKind {
    pub const ALL: [ModelKind; 13] = [
        ModelKind::Cluster,
        ModelKind::ClusterNode,
        ModelKind::Service,
        ModelKind::Cache,
        ModelKind::ConnectionManager,
        ModelKind::Connection,
        ModelKind::StorageManager,
        ModelKind::PointToPoint,
        ModelKind::Reporter,
        ModelKind::Management,
        ModelKind::HealthCheck,
        ModelKind::JmxReference,
        ModelKind::Wrapper,
    ];

    pub fn code(&self) -> u8 {
        match self {
            ModelKind::Cluster => 1,
            ModelKind::ClusterNode => 2,
            ModelKind::Service => 3,
            ModelKind::Cache => 4,
            ModelKind::ConnectionManager => 5,
            ModelKind::Connection => 6,
            ModelKind::StorageManager => 7,
            ModelKind::PointToPoint => 8,
            ModelKind::Reporter => 9,
            ModelKind::Management => 10,
            ModelKind::HealthCheck => 11,
            ModelKind::JmxReference => 12,
            ModelKind::Wrapper => 13,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.code() == code)
    }

    /// Name of the model component backing this kind
    pub fn model_name(&self) -> &'static str {
        match self {
            ModelKind::Cluster => "ClusterModel",
            ModelKind::ClusterNode => "ClusterNodeModel",
            ModelKind::Service => "ServiceModel",
            ModelKind::Cache => "CacheModel",
            ModelKind::ConnectionManager => "ConnectionManagerModel",
            ModelKind::Connection => "ConnectionModel",
            ModelKind::StorageManager => "StorageManagerModel",
            ModelKind::PointToPoint => "PointToPointModel",
            ModelKind::Reporter => "ReporterModel",
            ModelKind::Management => "ManagementModel",
            ModelKind::HealthCheck => "HealthCheckModel",
            ModelKind::JmxReference => "WrapperJmxModel",
            ModelKind::Wrapper => "WrapperModel",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_name())
    }
}

/// Snapshot of one local model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub name: String,
    pub kind: ModelKind,
    pub read_only: bool,
    pub attributes: BTreeMap<String, Value>,
}

impl ModelSnapshot {
    pub fn new(name: impl Into<String>, kind: ModelKind) -> Self {
        Self {
            name: name.into(),
            kind,
            read_only: false,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn stamp_refresh_time(&mut self, now_millis: i64) {
        self.attributes
            .insert(REFRESH_TIME_ATTRIBUTE.to_string(), Value::Date(now_millis));
    }

    pub fn refresh_time(&self) -> Option<i64> {
        self.attributes
            .get(REFRESH_TIME_ATTRIBUTE)
            .and_then(Value::as_i64)
    }

    /// A snapshot never stamped is always expired.
    pub fn is_expired(&self, ttl_millis: u64, now_millis: i64) -> bool {
        match self.refresh_time() {
            Some(stamp) => now_millis.saturating_sub(stamp) >= ttl_millis as i64,
            None => true,
        }
    }
}

/// Descriptive metadata for a registered bean.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MBeanInfo {
    pub class_name: String,
    pub description: String,
    pub attributes: Vec<String>,
    pub operations: Vec<String>,
}
