//! Management facade of one member.
//!
//! Owns the [`Gateway`] and the [`Connector`] and serves client requests:
//!
//! - a name registered on this member is served by its local model
//! - on a managing member, every other name goes through the MBean view,
//!   where remote names are cached [`RemoteModel`]s under the refresh policy
//! - on any other member, the request is forwarded to a managing member

use crate::bean::{HealthCheck, ManagedObject};
use crate::connector::{Connector, ConnectorState, StatsSnapshot};
use crate::error::{ManagementError, Result};
use crate::gateway::{BeanFactory, Gateway};
use crate::model::{listener_not_found, ModelRef};
use crate::notification::{ListenerHolder, NotificationListener};
use codec::{InvokeRemote, TaskResponse};
use config::ManagementConfig;
use network::InvocationService;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};
use types::{names, Filter, MBeanInfo, ManagementFunction, Member, NotificationFilter, Value};

/// Where a request for a name is served.
enum Route {
    Model(ModelRef),
    Proxy,
}

pub struct Management {
    config: ManagementConfig,
    service: Arc<dyn InvocationService>,
    gateway: Arc<Gateway>,
    connector: Arc<Connector>,
}

impl Management {
    pub fn new(config: ManagementConfig, service: Arc<dyn InvocationService>) -> Result<Self> {
        let connector = Connector::new(config.connector.clone());
        let gateway = Gateway::new(
            config.gateway.clone(),
            service.local_member().member,
            connector.clone(),
        );
        gateway.make_primary()?;
        Ok(Self {
            config,
            service,
            gateway,
            connector,
        })
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    pub fn connector(&self) -> &Arc<Connector> {
        &self.connector
    }

    pub fn local_member(&self) -> Member {
        self.gateway.local_member()
    }

    pub fn register_factory(&self, key: impl Into<String>, factory: BeanFactory) {
        self.gateway.register_factory(key, factory);
    }

    /// Join the federation (when configured) and register custom beans.
    pub fn start(&self) -> Result<()> {
        if self.config.connector.is_federated() {
            self.connector.start_service(self.service.clone())?;
        } else {
            debug!("Management federation disabled for this member");
        }
        let custom = self.gateway.register_custom_beans();
        info!(
            member = self.local_member().id,
            managing = self.connector.is_managing(),
            custom_beans = custom.len(),
            "Management started"
        );
        Ok(())
    }

    /// Leave the cluster; the connector resets on the local departure.
    pub fn shutdown(&self) {
        self.connector.set_cluster_running(false);
        self.service.shutdown();
        self.connector.dispatcher().shutdown();
    }

    pub fn state(&self) -> ConnectorState {
        self.connector.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.connector.stats().snapshot()
    }

    /// Register a bean of this member; returns its canonical name.
    pub fn register(&self, name: &str, object: ManagedObject) -> Result<String> {
        let canonical = self.gateway.ensure_global_name(name);
        self.gateway.register(&canonical, object)?;
        Ok(canonical)
    }

    /// Unregister a canonical name or a `,*` pattern.
    pub fn unregister(&self, name: &str) -> Vec<String> {
        self.gateway.unregister(name)
    }

    pub fn register_health_check(&self, check: Arc<dyn HealthCheck>) -> Result<String> {
        self.gateway.register_health_check(check)
    }

    async fn route(&self, name: &str) -> Result<Route> {
        if let Some(view) = self.connector.view() {
            if let Some(model) = view.model(name) {
                return Ok(Route::Model(model));
            }
            if names::is_global(name) {
                let model = self.connector.ensure_remote_model(name, None).await?;
                let model = ModelRef::Remote(model);
                view.register(model.clone());
                return Ok(Route::Model(model));
            }
            return Err(ManagementError::instance_not_found(name));
        }
        if let Some(model) = self.gateway.local_model(name) {
            return Ok(Route::Model(ModelRef::Local(model)));
        }
        if !self.connector.remote_servers().is_empty() {
            return Ok(Route::Proxy);
        }
        if names::is_global(name) && self.connector.service().is_some() {
            let model = self.connector.ensure_remote_model(name, None).await?;
            return Ok(Route::Model(ModelRef::Remote(model)));
        }
        Err(ManagementError::instance_not_found(name))
    }

    async fn proxy(&self, request: InvokeRemote) -> Result<TaskResponse> {
        self.connector.send_proxy_request(request).await
    }

    fn local_id(&self) -> types::MemberId {
        self.connector.local_member_id()
    }

    pub async fn get_attribute(&self, name: &str, attribute: &str) -> Result<Value> {
        match self.route(name).await? {
            Route::Model(model) => model.get_attribute(attribute).await,
            Route::Proxy => {
                match self
                    .proxy(InvokeRemote::get_attribute(self.local_id(), name, attribute))
                    .await?
                {
                    TaskResponse::Value(value) => Ok(value),
                    other => Err(unexpected(&other, name)),
                }
            }
        }
    }

    pub async fn get_attributes(
        &self,
        name: &str,
        filter: Option<Filter>,
    ) -> Result<BTreeMap<String, Value>> {
        match self.route(name).await? {
            Route::Model(model) => model.get_attributes(filter.as_ref()).await,
            Route::Proxy => {
                match self
                    .proxy(InvokeRemote::get_attributes(self.local_id(), name, filter))
                    .await?
                {
                    TaskResponse::Attributes(attributes) => Ok(attributes),
                    other => Err(unexpected(&other, name)),
                }
            }
        }
    }

    pub async fn set_attribute(&self, name: &str, attribute: &str, value: Value) -> Result<()> {
        match self.route(name).await? {
            Route::Model(model) => model.set_attribute(attribute, value).await,
            Route::Proxy => {
                match self
                    .proxy(InvokeRemote::set_attribute(self.local_id(), name, attribute, value))
                    .await?
                {
                    TaskResponse::Ack => Ok(()),
                    other => Err(unexpected(&other, name)),
                }
            }
        }
    }

    pub async fn invoke(
        &self,
        name: &str,
        operation: &str,
        params: Vec<Value>,
        signature: Vec<String>,
    ) -> Result<Value> {
        match self.route(name).await? {
            Route::Model(model) => model.invoke(operation, params).await,
            Route::Proxy => {
                match self
                    .proxy(InvokeRemote::invoke(self.local_id(), name, operation, params, signature))
                    .await?
                {
                    TaskResponse::Value(value) => Ok(value),
                    other => Err(unexpected(&other, name)),
                }
            }
        }
    }

    pub async fn mbean_info(&self, name: &str) -> Result<MBeanInfo> {
        match self.route(name).await? {
            Route::Model(model) => model.mbean_info().await,
            Route::Proxy => match self.proxy(InvokeRemote::mbean_info(self.local_id(), name)).await? {
                TaskResponse::Info(info) => Ok(info),
                other => Err(unexpected(&other, name)),
            },
        }
    }

    pub async fn is_mbean_registered(&self, name: &str) -> Result<bool> {
        if let Some(view) = self.connector.view() {
            return Ok(view.is_registered(name));
        }
        if self.gateway.is_registered(name) {
            return Ok(true);
        }
        if self.connector.remote_servers().is_empty() {
            return Ok(false);
        }
        match self.proxy(InvokeRemote::check(self.local_id(), name)).await? {
            TaskResponse::Bool(registered) => Ok(registered),
            other => Err(unexpected(&other, name)),
        }
    }

    /// Names matching a pattern across the federation.
    pub async fn query_names(&self, pattern: &str, filter: Option<Filter>) -> Result<BTreeSet<String>> {
        if let Some(view) = self.connector.view() {
            let names = view.query_names(pattern, filter.as_ref());
            self.connector.refresh_remote_models(&names);
            return Ok(names);
        }
        let mut names = self.gateway.query_local_names(pattern, filter.as_ref());
        if !self.connector.remote_servers().is_empty() {
            match self.proxy(InvokeRemote::query(self.local_id(), pattern, filter)).await? {
                TaskResponse::Names(remote) => names.extend(remote),
                other => return Err(unexpected(&other, pattern)),
            }
        }
        Ok(names)
    }

    /// Run a function against the managing member's view.
    pub async fn execute(&self, function: ManagementFunction) -> Result<Value> {
        if let Some(view) = self.connector.view() {
            return view.evaluate(&function).await;
        }
        match self.proxy(InvokeRemote::execute(self.local_id(), function)).await? {
            TaskResponse::Value(value) => Ok(value),
            other => Err(unexpected(&other, "execute")),
        }
    }

    pub async fn find_model_owner(&self, name: &str) -> Result<Option<Member>> {
        self.connector.find_model_owner(name).await
    }

    /// Listen to a bean; returns the registration id.
    pub async fn add_notification_listener(
        &self,
        name: &str,
        listener: Arc<dyn NotificationListener>,
        filter: Option<NotificationFilter>,
        handback: Option<Value>,
    ) -> Result<i64> {
        let holder = ListenerHolder::new(listener, filter, handback);
        let id = holder.id();
        let model = match self.route(name).await? {
            Route::Model(model) => model,
            Route::Proxy => ModelRef::Remote(self.connector.ensure_remote_model(name, None).await?),
        };
        model.add_listener(holder)?;
        Ok(id)
    }

    /// Remove a listener; `exact` limits removal to one filter and handback.
    pub async fn remove_notification_listener(
        &self,
        name: &str,
        listener: &Arc<dyn NotificationListener>,
        exact: Option<(Option<&NotificationFilter>, Option<&Value>)>,
    ) -> Result<usize> {
        let model = if let Some(model) = self.connector.view().and_then(|view| view.model(name)) {
            model
        } else if let Some(local) = self.gateway.local_model(name) {
            ModelRef::Local(local)
        } else if let Some(remote) = self.connector.remote_model(name) {
            ModelRef::Remote(remote)
        } else {
            return Err(listener_not_found(name));
        };
        model.remove_listener(listener, exact)
    }

    pub fn all_health_checks_live(&self) -> bool {
        self.gateway.all_health_checks_live()
    }

    pub fn all_health_checks_ready(&self) -> bool {
        self.gateway.all_health_checks_ready()
    }

    pub fn all_health_checks_safe(&self) -> bool {
        self.gateway.all_health_checks_safe()
    }

    pub fn all_health_checks_started(&self) -> bool {
        self.gateway.all_health_checks_started()
    }
}

fn unexpected(response: &TaskResponse, name: &str) -> ManagementError {
    ManagementError::illegal_state(format!(
        "Unexpected {} reply for {}",
        response.variant_name(),
        name
    ))
}
