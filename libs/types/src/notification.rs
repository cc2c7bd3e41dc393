//! Notifications emitted by managed beans and the filters applied to them.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Dotted notification type, e.g. `cache.evicted`
    pub kind: String,
    /// Canonical name of the emitting bean
    pub source: String,
    pub sequence: u64,
    pub timestamp_millis: i64,
    pub message: String,
    pub user_data: Option<Value>,
}

impl Notification {
    pub fn new(
        kind: impl Into<String>,
        source: impl Into<String>,
        sequence: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            source: source.into(),
            sequence,
            timestamp_millis: crate::current_time_millis(),
            message: message.into(),
            user_data: None,
        }
    }

    pub fn with_user_data(mut self, data: impl Into<Value>) -> Self {
        self.user_data = Some(data.into());
        self
    }
}

/// Serializable notification filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationFilter {
    /// Accept types starting with the prefix
    TypePrefix(String),
    /// Accept exactly these types
    Types(BTreeSet<String>),
    /// Accept notifications from one source name
    Source(String),
}

impl NotificationFilter {
    pub fn is_enabled(&self, notification: &Notification) -> bool {
        match self {
            NotificationFilter::TypePrefix(prefix) => notification.kind.starts_with(prefix.as_str()),
            NotificationFilter::Types(types) => types.contains(&notification.kind),
            NotificationFilter::Source(source) => &notification.source == source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters() {
        let n = Notification::new("cache.evicted", "type=Cache,nodeId=1", 1, "evicted");
        assert!(NotificationFilter::TypePrefix("cache.".into()).is_enabled(&n));
        assert!(!NotificationFilter::TypePrefix("service.".into()).is_enabled(&n));
        assert!(NotificationFilter::Types(["cache.evicted".to_string()].into()).is_enabled(&n));
        assert!(NotificationFilter::Source("type=Cache,nodeId=1".into()).is_enabled(&n));
        assert!(!NotificationFilter::Source("type=Cache,nodeId=2".into()).is_enabled(&n));
    }
}
