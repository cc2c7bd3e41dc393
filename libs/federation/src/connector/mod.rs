//! Management connector
//!
//! Runs the federation protocol over an [`InvocationService`]: announces the
//! member, pushes global registrations to managing members, relays
//! notifications and subscriptions, serves remote actions on a managing
//! member, and caches the beans of other members as
//! [`RemoteModel`](crate::model::RemoteModel)s.
//!
//! ## Lifecycle
//!
//! `Stopped → Starting → AwaitingAnnounce → Announced → Resetting → Stopped`
//!
//! A member becomes `Announced` only after every member answered its
//! announcement; only then does it push its registry to every managing
//! member it learned about. Registrations made before that point are
//! covered by the push.

pub mod endpoint;
mod handler;
mod membership;
mod refresh;
mod routing;
pub mod stats;

pub use endpoint::{PublishedEndpoint, CONNECTOR_URL_NAME};
pub use refresh::{RemoteModelReport, SubscriptionReport};
pub use stats::{ConnectorStats, StatsSnapshot};

use crate::dispatcher::EventDispatcher;
use crate::error::{ManagementError, Result};
use crate::gateway::Gateway;
use crate::mbean_server::MBeanView;
use crate::model::{LocalModel, Model, ModelRef, RemoteModel};
use crate::notification::NotificationRelay;
use async_trait::async_trait;
use bytes::Bytes;
use codec::{Announce, Publish, Register, Task, TaskResponse, Unregister};
use config::ConnectorConfig;
use dashmap::DashMap;
use endpoint::EndpointBinding;
use network::{
    dynamic_senior, InvocationObserver, InvocationService, LookupContext, TransportError,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};
use types::{names, Member, MemberId, ModelSnapshot, Notification};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectorState {
    Stopped,
    Starting,
    AwaitingAnnounce,
    Announced,
    Resetting,
}

pub struct Connector {
    config: ConnectorConfig,
    self_ref: Weak<Connector>,
    service: RwLock<Option<Arc<dyn InvocationService>>>,
    gateway: RwLock<Weak<Gateway>>,
    view: RwLock<Option<Arc<MBeanView>>>,
    /// Global models owned by this member
    local_registry: DashMap<String, Arc<LocalModel>>,
    /// Cached models of other members
    remote_models: DashMap<String, Arc<RemoteModel>>,
    /// Members known to run an MBean server
    remote_servers: RwLock<BTreeMap<MemberId, Member>>,
    managing: AtomicBool,
    announced: AtomicBool,
    cluster_running: AtomicBool,
    state: RwLock<ConnectorState>,
    start_failure: RwLock<Option<String>>,
    endpoint: Arc<RwLock<PublishedEndpoint>>,
    owns_endpoint: AtomicBool,
    stats: ConnectorStats,
    dispatcher: EventDispatcher,
}

impl Connector {
    pub fn new(config: ConnectorConfig) -> Arc<Self> {
        let managing = config.managed_nodes.is_managing();
        Arc::new_cyclic(|self_ref| Self {
            config,
            self_ref: self_ref.clone(),
            service: RwLock::new(None),
            gateway: RwLock::new(Weak::new()),
            view: RwLock::new(None),
            local_registry: DashMap::new(),
            remote_models: DashMap::new(),
            remote_servers: RwLock::new(BTreeMap::new()),
            managing: AtomicBool::new(managing),
            announced: AtomicBool::new(false),
            cluster_running: AtomicBool::new(false),
            state: RwLock::new(ConnectorState::Stopped),
            start_failure: RwLock::new(None),
            endpoint: Arc::new(RwLock::new(PublishedEndpoint::default())),
            owns_endpoint: AtomicBool::new(false),
            stats: ConnectorStats::default(),
            dispatcher: EventDispatcher::new("management"),
        })
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn stats(&self) -> &ConnectorStats {
        &self.stats
    }

    pub fn state(&self) -> ConnectorState {
        *self.state.read()
    }

    fn set_state(&self, state: ConnectorState) {
        let mut current = self.state.write();
        if *current != state {
            trace!(from = ?*current, to = ?state, "Connector state");
            *current = state;
        }
    }

    pub fn is_managing(&self) -> bool {
        self.managing.load(Ordering::SeqCst)
    }

    pub fn is_announced(&self) -> bool {
        self.announced.load(Ordering::SeqCst)
    }

    pub fn is_cluster_running(&self) -> bool {
        self.cluster_running.load(Ordering::SeqCst)
    }

    pub fn set_cluster_running(&self, running: bool) {
        self.cluster_running.store(running, Ordering::SeqCst);
    }

    pub(crate) fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub(crate) fn service(&self) -> Option<Arc<dyn InvocationService>> {
        self.service.read().clone()
    }

    pub fn local_member(&self) -> Option<Member> {
        self.service().map(|service| service.local_member().member)
    }

    /// Id of this member, or 0 while no service is attached.
    pub fn local_member_id(&self) -> MemberId {
        self.service().map_or(0, |service| service.local_member().id())
    }

    /// A running member of the management service.
    pub fn member(&self, id: MemberId) -> Option<Member> {
        self.service()?.service_member(id).map(|m| m.member)
    }

    pub(crate) fn attach_gateway(&self, gateway: &Arc<Gateway>) {
        *self.gateway.write() = Arc::downgrade(gateway);
    }

    fn gateway(&self) -> Option<Arc<Gateway>> {
        self.gateway.read().upgrade()
    }

    pub(crate) fn set_view(&self, view: Option<Arc<MBeanView>>) {
        let managing = view.is_some();
        *self.view.write() = view;
        self.managing.store(managing, Ordering::SeqCst);
    }

    pub fn view(&self) -> Option<Arc<MBeanView>> {
        self.view.read().clone()
    }

    pub fn remote_servers(&self) -> Vec<Member> {
        self.remote_servers.read().values().cloned().collect()
    }

    pub fn is_remote_server(&self, id: MemberId) -> bool {
        self.remote_servers.read().contains_key(&id)
    }

    pub fn remote_model(&self, name: &str) -> Option<Arc<RemoteModel>> {
        self.remote_models.get(name).map(|entry| entry.value().clone())
    }

    pub fn remote_model_names(&self) -> BTreeSet<String> {
        self.remote_models.iter().map(|e| e.key().clone()).collect()
    }

    pub fn local_model(&self, name: &str) -> Option<Arc<LocalModel>> {
        self.local_registry.get(name).map(|entry| entry.value().clone())
    }

    pub fn local_model_names(&self) -> BTreeSet<String> {
        self.local_registry.iter().map(|e| e.key().clone()).collect()
    }

    pub fn start_failure(&self) -> Option<String> {
        self.start_failure.read().clone()
    }

    pub fn clear_start_failure(&self) {
        *self.start_failure.write() = None;
    }

    fn record_start_failure(&self, message: &str) -> ManagementError {
        let first_line = message.lines().next().unwrap_or_default().to_string();
        warn!(reason = %first_line, "Management connector failed to start");
        *self.start_failure.write() = Some(first_line.clone());
        ManagementError::security(first_line)
    }

    pub fn format_refresh_policy(&self) -> &'static str {
        if self.is_managing() {
            self.config.refresh_policy.as_str()
        } else {
            "n/a"
        }
    }

    pub fn reset_statistics(&self) {
        self.stats.reset();
    }

    pub fn published_endpoint(&self) -> PublishedEndpoint {
        self.endpoint.read().clone()
    }

    /// URL a management client at `source` should use.
    pub fn resolve(&self, source: Option<IpAddr>) -> Option<String> {
        endpoint::resolve(
            &self.endpoint.read(),
            &LookupContext {
                source,
                accept: None,
            },
        )
    }

    pub(crate) fn relay(&self) -> Arc<dyn NotificationRelay> {
        Arc::new(ConnectorRelay {
            connector: self.self_ref.clone(),
        })
    }

    /// Attach to a running service and take part in the protocol.
    ///
    /// A previous start failure is reported again until it is cleared.
    pub fn start_service(&self, service: Arc<dyn InvocationService>) -> Result<()> {
        if let Some(reason) = self.start_failure() {
            return Err(ManagementError::security(reason));
        }
        self.set_state(ConnectorState::Starting);
        *self.service.write() = Some(service.clone());
        self.set_cluster_running(true);

        service.set_task_handler(Arc::new(handler::ConnectorHandler::new(self.self_ref.clone())));
        service.add_member_listener(Arc::new(membership::ConnectorMembership::new(
            self.self_ref.clone(),
        )));

        if self.is_managing() {
            if let Some(gateway) = self.gateway() {
                gateway.transition_to_managing();
            }
            if let Err(e) = self.start_endpoint() {
                self.set_state(ConnectorState::Stopped);
                return Err(e);
            }
        } else if self.is_dynamic_senior() {
            self.assume_management()?;
        }
        self.announce()
    }

    /// This member is the oldest member configured for dynamic management.
    pub fn is_dynamic_senior(&self) -> bool {
        if !self.config.managed_nodes.is_dynamic() {
            return false;
        }
        let Some(service) = self.service() else {
            return false;
        };
        let members = service.service_members();
        dynamic_senior(&members).map(|m| m.id()) == Some(service.local_member().id())
    }

    /// Become a managing member.
    pub(crate) fn assume_management(&self) -> Result<()> {
        if self.is_managing() {
            return Ok(());
        }
        let gateway = self
            .gateway()
            .ok_or_else(|| ManagementError::illegal_state("No gateway attached to the connector"))?;
        info!(member_id = self.local_member_id(), "Assuming management of the cluster");
        gateway.transition_to_managing();
        self.start_endpoint()
    }

    /// Publish the endpoint of this managing member and bind its URL.
    fn start_endpoint(&self) -> Result<()> {
        let service = self.service().ok_or(ManagementError::ServiceStopped)?;
        let local = service.local_member();

        let addresses = endpoint::listen_addresses(&self.config.connector_host, local.member.address)
            .map_err(|message| self.record_start_failure(&message))?;
        let url = endpoint::service_url(&self.config.connector_host, self.config.connector_port);
        {
            let mut published = self.endpoint.write();
            published.url = Some(url.clone());
            published.listen_addresses = addresses.clone();
        }
        self.owns_endpoint.store(true, Ordering::SeqCst);

        let binding = Arc::new(EndpointBinding {
            endpoint: self.endpoint.clone(),
        });
        match service.name_service().bind(CONNECTOR_URL_NAME, binding) {
            Ok(()) => debug!(url = %url, "Bound management URL"),
            Err(TransportError::NameService { .. }) => {
                trace!(url = %url, "Management URL already bound")
            }
            Err(e) => debug!(error = %e, "Failed to bind management URL"),
        }

        let others: Vec<MemberId> = self.other_members();
        self.publish_to(&others);
        Ok(())
    }

    /// Send the published endpoint to the given members.
    pub(crate) fn publish_to(&self, targets: &[MemberId]) {
        if targets.is_empty() {
            return;
        }
        let published = self.published_endpoint();
        let task = Publish {
            member_from: self.local_member_id(),
            service_url: published.url,
            listen_addresses: published.listen_addresses,
        };
        self.execute(Task::from(task), targets, None);
    }

    fn other_members(&self) -> Vec<MemberId> {
        let Some(service) = self.service() else {
            return Vec::new();
        };
        let local = service.local_member().id();
        service
            .service_members()
            .into_iter()
            .map(|m| m.id())
            .filter(|id| *id != local)
            .collect()
    }

    /// Broadcast the announcement; completion pushes the registry.
    pub(crate) fn announce(&self) -> Result<()> {
        self.announced.store(false, Ordering::SeqCst);
        self.set_state(ConnectorState::AwaitingAnnounce);

        let others = self.other_members();
        if others.is_empty() {
            self.on_announcement_completed();
            return Ok(());
        }

        let task = Announce {
            member_from: self.local_member_id(),
            managing_node: self.is_managing(),
        };
        let payload = Task::from(task).encode()?;
        let service = self.service().ok_or(ManagementError::ServiceStopped)?;
        let observer = Arc::new(AnnounceObserver {
            connector: self.self_ref.clone(),
        });
        debug!(members = ?others, managing = self.is_managing(), "Announcing");
        service.execute(payload, &others, Some(observer))?;
        Ok(())
    }

    /// Every member answered the announcement.
    pub(crate) fn on_announcement_completed(&self) {
        self.announced.store(true, Ordering::SeqCst);
        self.set_state(ConnectorState::Announced);
        let servers: Vec<MemberId> = self.remote_servers.read().keys().copied().collect();
        debug!(servers = ?servers, "Announcement completed");
        self.register_all(&servers);
    }

    /// Track a global model of this member and push it to managing members.
    pub(crate) fn register_model(&self, model: Arc<LocalModel>) {
        let name = model.name().to_string();
        let snapshot = model.snapshot();
        self.local_registry.insert(name, model);

        if self.is_announced() {
            let servers: Vec<MemberId> = self.remote_servers.read().keys().copied().collect();
            self.send_register(vec![snapshot], &servers);
        }
    }

    /// Forget a global model of this member (or a `,*` pattern of them).
    pub(crate) fn unregister_model(&self, name: &str) {
        let (base, wildcard) = names::split_wildcard(name);
        if wildcard {
            self.local_registry
                .retain(|key, _| !names::matches_pattern(key, base));
        } else {
            self.local_registry.remove(name);
        }

        if self.is_announced() && self.config.exports_beans() {
            let servers: Vec<MemberId> = self.remote_servers.read().keys().copied().collect();
            if !servers.is_empty() {
                let task = Unregister {
                    member_from: self.local_member_id(),
                    name: name.to_string(),
                };
                self.execute(Task::from(task), &servers, None);
            }
        }
    }

    /// Push every global model of this member to the given members.
    pub(crate) fn register_all(&self, targets: &[MemberId]) {
        let snapshots: Vec<ModelSnapshot> = self
            .local_registry
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        self.send_register(snapshots, targets);
    }

    fn send_register(&self, snapshots: Vec<ModelSnapshot>, targets: &[MemberId]) {
        if snapshots.is_empty() || targets.is_empty() || !self.config.exports_beans() {
            return;
        }
        trace!(count = snapshots.len(), targets = ?targets, "Sending registrations");
        let task = Register {
            member_from: self.local_member_id(),
            snapshots,
        };
        self.execute(Task::from(task), targets, None);
    }

    /// Fire-and-forget; failures are logged.
    pub(crate) fn execute(
        &self,
        task: Task,
        targets: &[MemberId],
        observer: Option<Arc<dyn InvocationObserver>>,
    ) {
        let Some(service) = self.service() else {
            trace!(task = ?task.kind(), "No service, task dropped");
            return;
        };
        let kind = task.kind();
        let result = task
            .encode()
            .map_err(ManagementError::from)
            .and_then(|payload| Ok(service.execute(payload, targets, observer)?));
        if let Err(e) = result {
            debug!(task = ?kind, error = %e, "Failed to send task");
        }
    }

    /// The local service stopped: drop everything learned from the cluster.
    ///
    /// The registry of this member survives a service restart; it is only
    /// dropped when the whole cluster is shutting down.
    pub(crate) fn reset(&self) {
        self.set_state(ConnectorState::Resetting);
        self.announced.store(false, Ordering::SeqCst);

        if !self.is_cluster_running() {
            if let Some(gateway) = self.gateway() {
                gateway.reset();
            }
        }
        self.remote_servers.write().clear();
        let view = self.view();
        for (name, model) in self.drain_remote_models() {
            if let Some(view) = view.as_ref() {
                view.unregister(&name, Some(&ModelRef::Remote(model)));
            }
        }

        if self.owns_endpoint.swap(false, Ordering::SeqCst) {
            if let Some(service) = self.service() {
                service.name_service().unbind(CONNECTOR_URL_NAME);
            }
        }
        *self.endpoint.write() = PublishedEndpoint::default();
        if self.config.managed_nodes.is_dynamic() {
            self.set_view(None);
        }

        *self.service.write() = None;
        self.clear_start_failure();
        self.set_state(ConnectorState::Stopped);
        debug!("Connector reset");
    }
}

/// Relays notifications of local models to subscribed members.
struct ConnectorRelay {
    connector: Weak<Connector>,
}

impl NotificationRelay for ConnectorRelay {
    fn relay(&self, name: &str, notification: &Notification, members: &[MemberId]) {
        if let Some(connector) = self.connector.upgrade() {
            let task = codec::Notify {
                member_from: connector.local_member_id(),
                name: name.to_string(),
                notification: Some(notification.clone()),
            };
            connector.execute(Task::from(task), members, None);
        }
    }
}

/// Collects the announcement replies of every member.
struct AnnounceObserver {
    connector: Weak<Connector>,
}

#[async_trait]
impl InvocationObserver for AnnounceObserver {
    async fn member_completed(&self, member: MemberId, reply: Bytes) {
        let Some(connector) = self.connector.upgrade() else {
            return;
        };
        match TaskResponse::decode(&reply) {
            Ok(TaskResponse::Bool(true)) => connector.add_remote_server(member),
            Ok(TaskResponse::Bool(false)) => trace!(member, "Member is not managing"),
            Ok(other) => debug!(member, reply = other.variant_name(), "Unexpected announce reply"),
            Err(e) => debug!(member, error = %e, "Undecodable announce reply"),
        }
    }

    async fn member_failed(&self, member: MemberId, error: TransportError) {
        debug!(member, error = %error, "Announcement failed");
    }

    async fn member_left(&self, member: MemberId) {
        trace!(member, "Member left during announcement");
    }

    async fn invocation_completed(&self) {
        if let Some(connector) = self.connector.upgrade() {
            connector.on_announcement_completed();
        }
    }
}

impl Connector {
    fn drain_remote_models(&self) -> Vec<(String, Arc<RemoteModel>)> {
        let names: Vec<String> = self.remote_models.iter().map(|e| e.key().clone()).collect();
        names
            .into_iter()
            .filter_map(|name| self.remote_models.remove(&name))
            .collect()
    }

    pub(crate) fn add_remote_server(&self, id: MemberId) {
        match self.member(id) {
            Some(member) => {
                debug!(member_id = id, "Added management server");
                self.remote_servers.write().insert(id, member);
            }
            None => trace!(member_id = id, "Management server already gone"),
        }
    }
}
