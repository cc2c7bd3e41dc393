//! MBean view of a managing member.
//!
//! Holds every model the member exposes to management clients: its own
//! local models and a [`RemoteModel`](crate::model::RemoteModel) for each
//! global bean of another member. Replacing a model carries its listeners
//! over to the new one.

use crate::error::{ManagementError, Result};
use crate::model::{ModelRef, PlaceholderModel};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};
use types::{names, Filter, MBeanInfo, ManagementFunction, Value};

#[derive(Default)]
pub struct MBeanView {
    models: DashMap<String, ModelRef>,
}

impl MBeanView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model, returning the one it replaced.
    pub fn register(&self, model: ModelRef) -> Option<ModelRef> {
        let name = model.name().to_string();
        let previous = self.models.insert(name.clone(), model.clone());

        if let Some(old) = previous.as_ref().filter(|old| !old.is_same(&model)) {
            if !old.is_placeholder() && old.kind() != model.kind() {
                warn!(
                    name = %name,
                    previous = %old.kind(),
                    current = %model.kind(),
                    "MBean re-registered with a different type"
                );
            }
            for holder in old.release_listeners() {
                if let Err(e) = model.add_listener(holder) {
                    debug!(name = %name, error = %e, "Listener not carried over");
                }
            }
        }
        previous
    }

    /// Unregister a name or a `,*` pattern. With `expected`, only that model
    /// instance is removed. A subscribed responsibility bean is replaced by a
    /// placeholder that keeps its listeners.
    pub fn unregister(&self, name: &str, expected: Option<&ModelRef>) -> Vec<String> {
        let (base, wildcard) = names::split_wildcard(name);
        let candidates: Vec<String> = if wildcard {
            self.models
                .iter()
                .filter(|entry| names::matches_pattern(entry.key(), base))
                .map(|entry| entry.key().clone())
                .collect()
        } else {
            vec![name.to_string()]
        };

        let mut removed = Vec::new();
        for candidate in candidates {
            let Some(current) = self.model(&candidate) else {
                continue;
            };
            if expected.map_or(false, |model| !model.is_same(&current)) {
                continue;
            }

            if names::is_responsibility(&candidate)
                && !current.is_placeholder()
                && current.is_subscribed_to()
            {
                let placeholder = Arc::new(placeholder_for(&current));
                let holder_model = ModelRef::Placeholder(placeholder);
                for holder in current.release_listeners() {
                    // placeholders only keep holders locally
                    let _ = holder_model.add_listener(holder);
                }
                self.models.insert(candidate.clone(), holder_model);
                debug!(name = %candidate, "Responsibility MBean kept as placeholder");
            } else {
                self.models.remove(&candidate);
            }
            removed.push(candidate);
        }
        removed
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn model(&self, name: &str) -> Option<ModelRef> {
        self.models.get(name).map(|entry| entry.value().clone())
    }

    /// Names matching a pattern (`*`, `key=value,*`, or an exact name).
    pub fn query_names(&self, pattern: &str, filter: Option<&Filter>) -> BTreeSet<String> {
        let (base, wildcard) = names::split_wildcard(pattern);
        self.models
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|name| {
                if pattern.is_empty() || wildcard {
                    names::matches_pattern(name, base)
                } else {
                    name == pattern
                }
            })
            .filter(|name| filter.map_or(true, |f| f.evaluate(name)))
            .collect()
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.models.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn clear(&self) {
        self.models.clear();
    }

    /// Run a management function against this view.
    pub async fn evaluate(&self, function: &ManagementFunction) -> Result<Value> {
        match function {
            ManagementFunction::QueryNames { pattern } => Ok(Value::List(
                self.query_names(pattern, None)
                    .into_iter()
                    .map(Value::Text)
                    .collect(),
            )),
            ManagementFunction::CollectAttribute { pattern, attribute } => {
                let mut collected = BTreeMap::new();
                for name in self.query_names(pattern, None) {
                    let Some(model) = self.model(&name) else {
                        continue;
                    };
                    match model.get_attribute(attribute).await {
                        Ok(value) => {
                            collected.insert(name, value);
                        }
                        Err(e) => debug!(name = %name, attribute = %attribute, error = %e, "Attribute skipped"),
                    }
                }
                Ok(Value::Map(collected))
            }
            ManagementFunction::CountModels { pattern } => {
                Ok(Value::Long(self.query_names(pattern, None).len() as i64))
            }
        }
    }

    pub fn require(&self, name: &str) -> Result<ModelRef> {
        self.model(name)
            .ok_or_else(|| ManagementError::instance_not_found(name))
    }
}

fn placeholder_for(model: &ModelRef) -> PlaceholderModel {
    let info = match model {
        ModelRef::Local(local) => local.mbean_info(),
        ModelRef::Remote(remote) => MBeanInfo {
            class_name: model.kind().model_name().to_string(),
            description: String::new(),
            attributes: remote
                .latest_snapshot()
                .map(|snapshot| snapshot.attributes.into_keys().collect())
                .unwrap_or_default(),
            operations: Vec::new(),
        },
        ModelRef::Placeholder(_) => MBeanInfo::default(),
    };
    PlaceholderModel::new(model.name(), model.kind(), info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::{ManagedObject, SimpleBean};
    use crate::model::LocalModel;
    use crate::notification::{ListenerHolder, NotificationListener};
    use types::Notification;

    struct Silent;

    impl NotificationListener for Silent {
        fn handle_notification(&self, _notification: &Notification, _handback: Option<&Value>) {}
    }

    fn local(name: &str, size: i64) -> ModelRef {
        let bean = SimpleBean::new("CacheMBean").with_attribute("Size", size);
        ModelRef::Local(Arc::new(LocalModel::new(
            name,
            ManagedObject::Cache(Arc::new(bean)),
            false,
        )))
    }

    #[test]
    fn test_pattern_unregister() {
        let view = MBeanView::new();
        view.register(local("type=Cache,name=a,nodeId=1", 1));
        view.register(local("type=Cache,name=b,nodeId=1", 2));
        view.register(local("type=Cache,name=a,nodeId=2", 3));

        let mut removed = view.unregister("nodeId=1,*", None);
        removed.sort();
        assert_eq!(
            removed,
            vec!["type=Cache,name=a,nodeId=1", "type=Cache,name=b,nodeId=1"]
        );
        assert_eq!(view.names().len(), 1);
    }

    #[test]
    fn test_unregister_only_expected_instance() {
        let view = MBeanView::new();
        let first = local("type=Cache,name=a,nodeId=1", 1);
        view.register(first.clone());
        let second = local("type=Cache,name=a,nodeId=1", 2);
        view.register(second.clone());

        assert!(view.unregister("type=Cache,name=a,nodeId=1", Some(&first)).is_empty());
        assert_eq!(view.unregister("type=Cache,name=a,nodeId=1", Some(&second)).len(), 1);
    }

    #[test]
    fn test_replacement_carries_listeners() {
        let view = MBeanView::new();
        let first = local("type=Service,responsibility=Lead", 1);
        view.register(first.clone());
        let listener: Arc<dyn NotificationListener> = Arc::new(Silent);
        first.add_listener(ListenerHolder::new(listener, None, None)).unwrap();

        let removed = view.unregister("type=Service,responsibility=Lead", None);
        assert_eq!(removed.len(), 1);
        let placeholder = view.model("type=Service,responsibility=Lead").unwrap();
        assert!(placeholder.is_placeholder());
        assert!(placeholder.is_subscribed_to());

        let second = local("type=Service,responsibility=Lead", 2);
        view.register(second.clone());
        assert!(second.is_subscribed_to());
        assert!(!first.is_subscribed_to());
    }

    #[tokio::test]
    async fn test_functions() {
        let view = MBeanView::new();
        view.register(local("type=Cache,name=a,nodeId=1", 1));
        view.register(local("type=Cache,name=b,nodeId=2", 2));

        let count = view
            .evaluate(&ManagementFunction::CountModels {
                pattern: "type=Cache,*".into(),
            })
            .await
            .unwrap();
        assert_eq!(count, Value::Long(2));

        let sizes = view
            .evaluate(&ManagementFunction::CollectAttribute {
                pattern: "*".into(),
                attribute: "Size".into(),
            })
            .await
            .unwrap();
        let Value::Map(sizes) = sizes else {
            panic!("expected a map");
        };
        assert_eq!(sizes.get("type=Cache,name=b,nodeId=2"), Some(&Value::Long(2)));
    }
}
