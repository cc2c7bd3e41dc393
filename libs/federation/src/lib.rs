//! # Management Federation
//!
//! Cluster-wide management of named beans. Every member runs a
//! [`Management`] facade made of:
//!
//! - a [`Gateway`]: the local registry of models, health checks and custom
//!   beans, with name globalization (`...,nodeId=<id>`)
//! - a [`Connector`]: the member's participation in the federation. It
//!   announces itself, ships registrations to managing members, relays
//!   notifications and answers remote requests
//! - on managing members, an [`MBeanView`] holding every local model plus
//!   a cached [`RemoteModel`] per global name of other members
//!
//! Members that do not manage forward every request for a name they do not
//! own to a managing member ([`Connector::send_proxy_request`]).
//!
//! ```rust,no_run
//! use config::ManagementConfig;
//! use federation::{Management, ManagedObject, SimpleBean};
//! use network::{JoinRequest, LocalFabric};
//! use std::sync::Arc;
//!
//! # async fn demo() -> federation::Result<()> {
//! let fabric = LocalFabric::default();
//! let service = fabric.join(JoinRequest::new("127.0.0.1".parse().unwrap()));
//! let management = Management::new(ManagementConfig::default(), service)?;
//! management.start()?;
//!
//! let bean = SimpleBean::new("Cache").with_attribute("Size", 0i64);
//! let name = management.register("type=Cache,name=orders", ManagedObject::Cache(Arc::new(bean)))?;
//! let size = management.get_attribute(&name, "Size").await?;
//! # let _ = size;
//! # Ok(())
//! # }
//! ```

pub mod bean;
pub mod connector;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod health;
pub mod management;
pub mod mbean_server;
pub mod model;
pub mod notification;

pub use bean::{HealthCheck, ManagedBean, ManagedObject, SimpleBean};
pub use connector::{
    Connector, ConnectorState, ConnectorStats, RemoteModelReport, StatsSnapshot,
    SubscriptionReport,
};
pub use dispatcher::EventDispatcher;
pub use error::{ManagementError, Result};
pub use gateway::{BeanFactory, CustomBean, Gateway};
pub use management::Management;
pub use mbean_server::MBeanView;
pub use model::{LocalModel, Model, ModelRef, RemoteModel};
pub use notification::{ListenerHolder, NotificationHandler, NotificationListener};
