//! Health checks exposed as managed beans and aggregated per member.

use crate::bean::{HealthCheck, ManagedBean};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;
use types::{names, ModelKind, Value};

pub const SUBTYPE_CLUSTER: &str = "cluster";
pub const SUBTYPE_SERVICE: &str = "service";
pub const SUBTYPE_APPLICATION: &str = "application";

/// Short name of the bean that publishes a health check.
pub fn health_mbean_name(sub_type: &str, check_name: &str) -> String {
    format!("{},subType={},name={}", names::HEALTH_TYPE, sub_type, check_name)
}

/// Sub type of the health entry registered next to a model of `kind`.
pub fn sub_type_for(kind: ModelKind) -> &'static str {
    match kind {
        ModelKind::Cluster => SUBTYPE_CLUSTER,
        ModelKind::Service => SUBTYPE_SERVICE,
        _ => SUBTYPE_APPLICATION,
    }
}

/// Managed view of a health check.
pub struct HealthCheckBean {
    check: Arc<dyn HealthCheck>,
    sub_type: &'static str,
}

impl HealthCheckBean {
    pub fn new(check: Arc<dyn HealthCheck>, sub_type: &'static str) -> Self {
        Self { check, sub_type }
    }

    pub fn application(check: Arc<dyn HealthCheck>) -> Self {
        Self::new(check, SUBTYPE_APPLICATION)
    }

    pub fn mbean_name(&self) -> String {
        health_mbean_name(self.sub_type, &self.check.name())
    }

    pub fn check(&self) -> &Arc<dyn HealthCheck> {
        &self.check
    }
}

impl ManagedBean for HealthCheckBean {
    fn class_name(&self) -> &str {
        "HealthCheck"
    }

    fn attributes(&self) -> BTreeMap<String, Value> {
        let mut attrs = BTreeMap::new();
        attrs.insert("Name".to_string(), Value::Text(self.check.name()));
        attrs.insert("SubType".to_string(), Value::Text(self.sub_type.to_string()));
        attrs.insert("Live".to_string(), Value::Bool(self.check.is_live()));
        attrs.insert("Ready".to_string(), Value::Bool(self.check.is_ready()));
        attrs.insert("Safe".to_string(), Value::Bool(self.check.is_safe()));
        attrs.insert("Started".to_string(), Value::Bool(self.check.is_started()));
        attrs.insert(
            "MemberHealthCheck".to_string(),
            Value::Bool(self.check.is_member_health_check()),
        );
        attrs
    }
}

/// Which health aspect an aggregate asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAspect {
    Live,
    Ready,
    Safe,
    Started,
}

impl HealthAspect {
    fn label(&self) -> &'static str {
        match self {
            HealthAspect::Live => "Liveness",
            HealthAspect::Ready => "Readiness",
            HealthAspect::Safe => "Safety",
            HealthAspect::Started => "Started",
        }
    }

    fn ask(&self, check: &dyn HealthCheck) -> bool {
        match self {
            HealthAspect::Live => check.is_live(),
            HealthAspect::Ready => check.is_ready(),
            HealthAspect::Safe => check.is_safe(),
            HealthAspect::Started => check.is_started(),
        }
    }
}

/// True when every member check passes; false when there are none.
pub fn aggregate(checks: &DashMap<String, Arc<dyn HealthCheck>>, aspect: HealthAspect) -> bool {
    if checks.is_empty() {
        warn!("Health: {} check failed, no health checks registered", aspect.label());
        return false;
    }
    let snapshot: Vec<Arc<dyn HealthCheck>> = checks.iter().map(|e| e.value().clone()).collect();
    snapshot
        .iter()
        .filter(|check| check.is_member_health_check())
        .all(|check| aspect.ask(check.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        ok: bool,
        member: bool,
    }

    impl HealthCheck for Fixed {
        fn name(&self) -> String {
            self.name.to_string()
        }
        fn is_live(&self) -> bool {
            self.ok
        }
        fn is_ready(&self) -> bool {
            self.ok
        }
        fn is_safe(&self) -> bool {
            true
        }
        fn is_started(&self) -> bool {
            true
        }
        fn is_member_health_check(&self) -> bool {
            self.member
        }
    }

    #[test]
    fn test_empty_aggregate_is_false() {
        let checks = DashMap::new();
        assert!(!aggregate(&checks, HealthAspect::Live));
    }

    #[test]
    fn test_only_member_checks_count() {
        let checks: DashMap<String, Arc<dyn HealthCheck>> = DashMap::new();
        checks.insert("a".into(), Arc::new(Fixed { name: "a", ok: true, member: true }));
        checks.insert("b".into(), Arc::new(Fixed { name: "b", ok: false, member: false }));
        assert!(aggregate(&checks, HealthAspect::Ready));

        checks.insert("c".into(), Arc::new(Fixed { name: "c", ok: false, member: true }));
        assert!(!aggregate(&checks, HealthAspect::Ready));
        assert!(aggregate(&checks, HealthAspect::Safe));
    }

    #[test]
    fn test_bean_attributes() {
        let bean = HealthCheckBean::new(
            Arc::new(Fixed { name: "storage", ok: true, member: true }),
            sub_type_for(ModelKind::Service),
        );
        assert_eq!(bean.mbean_name(), "type=HealthCheck,subType=service,name=storage");
        assert_eq!(bean.attributes().get("Live"), Some(&Value::Bool(true)));
    }
}
