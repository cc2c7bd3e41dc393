//! Named managed-object proxies.
//!
//! Every model has a canonical name assigned at registration and at most one
//! local [`NotificationHandler`], created on first subscription. A
//! [`LocalModel`] wraps a bean living on this member; a [`RemoteModel`]
//! caches snapshots of a bean owned by another member. The managing view
//! refers to either through [`ModelRef`].

pub mod local;
pub mod remote;

pub use local::LocalModel;
pub use remote::{ExecuteMutex, MutexAcquire, RemoteModel};

use crate::error::{ManagementError, Result};
use crate::notification::{ListenerHolder, NotificationHandler, NotificationListener};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use types::{Filter, MBeanInfo, ModelKind, Notification, NotificationFilter, Value};

/// Name and lazily created listener set shared by every model variant.
#[derive(Default)]
pub struct ModelBase {
    name: String,
    handler: OnceCell<NotificationHandler>,
}

impl ModelBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> Option<&NotificationHandler> {
        self.handler.get()
    }

    pub fn ensure_handler(&self) -> &NotificationHandler {
        self.handler.get_or_init(NotificationHandler::default)
    }
}

/// Behaviour common to local and remote models.
pub trait Model: Send + Sync {
    fn base(&self) -> &ModelBase;

    fn kind(&self) -> ModelKind;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn has_local_listeners(&self) -> bool {
        self.base().handler().map_or(false, |h| !h.is_empty())
    }

    /// Deliver to the listeners registered on this member.
    fn handle_notification(&self, notification: &Notification) -> usize {
        self.base()
            .handler()
            .map_or(0, |handler| handler.dispatch(notification))
    }
}

/// Stand-in that keeps the subscriptions of a responsibility bean while no
/// member holds the responsibility.
pub struct PlaceholderModel {
    base: ModelBase,
    kind: ModelKind,
    info: MBeanInfo,
}

impl PlaceholderModel {
    pub fn new(name: impl Into<String>, kind: ModelKind, info: MBeanInfo) -> Self {
        Self {
            base: ModelBase::new(name),
            kind,
            info,
        }
    }
}

impl Model for PlaceholderModel {
    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn kind(&self) -> ModelKind {
        self.kind
    }
}

/// A model registered in the managing view.
#[derive(Clone)]
pub enum ModelRef {
    Local(Arc<LocalModel>),
    Remote(Arc<RemoteModel>),
    Placeholder(Arc<PlaceholderModel>),
}

impl ModelRef {
    fn as_model(&self) -> &dyn Model {
        match self {
            ModelRef::Local(model) => model.as_ref(),
            ModelRef::Remote(model) => model.as_ref(),
            ModelRef::Placeholder(model) => model.as_ref(),
        }
    }

    pub fn name(&self) -> &str {
        self.as_model().name()
    }

    pub fn kind(&self) -> ModelKind {
        self.as_model().kind()
    }

    /// Same model instance
    pub fn is_same(&self, other: &ModelRef) -> bool {
        match (self, other) {
            (ModelRef::Local(a), ModelRef::Local(b)) => Arc::ptr_eq(a, b),
            (ModelRef::Remote(a), ModelRef::Remote(b)) => Arc::ptr_eq(a, b),
            (ModelRef::Placeholder(a), ModelRef::Placeholder(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ModelRef::Placeholder(_))
    }

    /// Listeners here, or members subscribed to a local model
    pub fn is_subscribed_to(&self) -> bool {
        match self {
            ModelRef::Local(model) => model.is_subscribed_to(),
            other => other.as_model().has_local_listeners(),
        }
    }

    pub fn handle_notification(&self, notification: &Notification) -> usize {
        self.as_model().handle_notification(notification)
    }

    pub async fn get_attribute(&self, attribute: &str) -> Result<Value> {
        match self {
            ModelRef::Local(model) => model.get_attribute(attribute),
            ModelRef::Remote(model) => model.get_attribute(attribute).await,
            ModelRef::Placeholder(_) => Ok(Value::Null),
        }
    }

    pub async fn get_attributes(&self, filter: Option<&Filter>) -> Result<BTreeMap<String, Value>> {
        match self {
            ModelRef::Local(model) => Ok(model.get_attributes(filter)),
            ModelRef::Remote(model) => model.get_attributes(filter).await,
            ModelRef::Placeholder(_) => Ok(BTreeMap::new()),
        }
    }

    pub async fn set_attribute(&self, attribute: &str, value: Value) -> Result<()> {
        match self {
            ModelRef::Local(model) => model.set_attribute(attribute, value),
            ModelRef::Remote(model) => model.set_attribute(attribute, value).await,
            ModelRef::Placeholder(model) => Err(ManagementError::unknown_attribute(
                attribute,
                model.base.name(),
            )),
        }
    }

    pub async fn invoke(&self, operation: &str, params: Vec<Value>) -> Result<Value> {
        match self {
            ModelRef::Local(model) => model.invoke(operation, &params),
            ModelRef::Remote(model) => model.invoke(operation, params).await,
            ModelRef::Placeholder(model) => Err(ManagementError::unsupported(format!(
                "MBean {} currently has no owner",
                model.base.name()
            ))),
        }
    }

    pub async fn mbean_info(&self) -> Result<MBeanInfo> {
        match self {
            ModelRef::Local(model) => Ok(model.mbean_info()),
            ModelRef::Remote(model) => model.mbean_info().await,
            ModelRef::Placeholder(model) => Ok(model.info.clone()),
        }
    }

    pub fn add_listener(&self, holder: ListenerHolder) -> Result<()> {
        match self {
            ModelRef::Remote(model) => model.add_listener(holder),
            other => {
                other.as_model().base().ensure_handler().add(holder);
                Ok(())
            }
        }
    }

    /// Remove the listener; `exact` narrows removal to one registration.
    pub fn remove_listener(
        &self,
        listener: &Arc<dyn NotificationListener>,
        exact: Option<(Option<&NotificationFilter>, Option<&Value>)>,
    ) -> Result<usize> {
        let removed = match self {
            ModelRef::Remote(model) => return model.remove_listener(listener, exact),
            other => remove_from(other.as_model().base(), listener, exact),
        };
        if removed.is_empty() {
            return Err(listener_not_found(self.name()));
        }
        Ok(removed.len())
    }

    /// Take every listener registered here, releasing remote subscriptions.
    pub fn release_listeners(&self) -> Vec<ListenerHolder> {
        match self {
            ModelRef::Remote(model) => model.release_listeners(),
            other => other
                .as_model()
                .base()
                .handler()
                .map(NotificationHandler::drain)
                .unwrap_or_default(),
        }
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            ModelRef::Local(_) => "Local",
            ModelRef::Remote(_) => "Remote",
            ModelRef::Placeholder(_) => "Placeholder",
        };
        write!(f, "{}({})", variant, self.name())
    }
}

pub(crate) fn remove_from(
    base: &ModelBase,
    listener: &Arc<dyn NotificationListener>,
    exact: Option<(Option<&NotificationFilter>, Option<&Value>)>,
) -> Vec<ListenerHolder> {
    let Some(handler) = base.handler() else {
        return Vec::new();
    };
    match exact {
        Some((filter, handback)) => handler
            .remove_exact(listener, filter, handback)
            .into_iter()
            .collect(),
        None => handler.remove_listener(listener),
    }
}

pub(crate) fn listener_not_found(name: &str) -> ManagementError {
    ManagementError::illegal_argument(format!("Listener is not registered with MBean {}", name))
}

/// Keep only the attributes the filter accepts.
pub(crate) fn filter_attributes(
    attributes: BTreeMap<String, Value>,
    filter: Option<&Filter>,
) -> BTreeMap<String, Value> {
    match filter {
        None => attributes,
        Some(filter) => attributes
            .into_iter()
            .filter(|(name, _)| filter.evaluate(name))
            .collect(),
    }
}
