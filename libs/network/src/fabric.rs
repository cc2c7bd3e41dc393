//! In-process cluster fabric.
//!
//! Each joined member owns an inbound queue drained by a single service task,
//! so tasks and membership events are handled one at a time in arrival
//! order. Payloads cross the fabric as encoded bytes, exactly as they would
//! over a socket.
//!
//! A handler running on the service task must never `query` another member:
//! if that member is waiting on us the two service tasks deadlock. Handlers
//! that need a round-trip return [`TaskReply::Deferred`] instead.

use crate::error::{Result, TransportError};
use crate::invocation::{
    DeliveryContext, InvocationObserver, InvocationService, TaskHandler, TaskReply,
};
use crate::membership::{MemberListener, ServiceMember, DYNAMIC_MANAGEMENT_KEY};
use crate::name_service::NameService;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};
use types::{current_time_millis, Member, MemberId, ProductVersion};

#[derive(Debug, Clone)]
pub struct FabricConfig {
    pub service_name: String,
    pub request_timeout: Duration,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            service_name: "Management".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Fabric counters
#[derive(Debug, Default)]
pub struct FabricMetrics {
    pub tasks_delivered: AtomicU64,
    pub replies_lost: AtomicU64,
    pub timeouts: AtomicU64,
    pub members_joined: AtomicU64,
    pub members_left: AtomicU64,
}

/// Identity of a member joining the fabric.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub name: Option<String>,
    pub address: IpAddr,
    pub version: ProductVersion,
    pub dynamic_management: bool,
}

impl JoinRequest {
    pub fn new(address: IpAddr) -> Self {
        Self {
            name: None,
            address,
            version: ProductVersion::CURRENT,
            dynamic_management: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: ProductVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_dynamic_management(mut self, dynamic: bool) -> Self {
        self.dynamic_management = dynamic;
        self
    }
}

enum Inbound {
    Task {
        ctx: DeliveryContext,
        payload: Bytes,
        reply: oneshot::Sender<Result<Bytes>>,
    },
    Joined(ServiceMember),
    Left(ServiceMember),
}

struct Endpoint {
    member: ServiceMember,
    inbound: mpsc::UnboundedSender<Inbound>,
    /// Taken when the service task starts
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    running: AtomicBool,
    handler: RwLock<Option<Arc<dyn TaskHandler>>>,
    listeners: RwLock<Vec<Arc<dyn MemberListener>>>,
}

impl Endpoint {
    fn deliver(&self, item: Inbound) -> bool {
        self.inbound.send(item).is_ok()
    }
}

struct FabricInner {
    config: FabricConfig,
    members: RwLock<BTreeMap<MemberId, Arc<Endpoint>>>,
    next_id: AtomicU32,
    last_join_millis: AtomicI64,
    name_service: Arc<NameService>,
    metrics: FabricMetrics,
}

/// An in-process cluster carrying one invocation service.
#[derive(Clone)]
pub struct LocalFabric {
    inner: Arc<FabricInner>,
}

impl std::fmt::Debug for LocalFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFabric")
            .field("service", &self.inner.config.service_name)
            .field("members", &self.inner.members.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for LocalFabric {
    fn default() -> Self {
        Self::new(FabricConfig::default())
    }
}

impl LocalFabric {
    pub fn new(config: FabricConfig) -> Self {
        Self {
            inner: Arc::new(FabricInner {
                config,
                members: RwLock::new(BTreeMap::new()),
                next_id: AtomicU32::new(1),
                last_join_millis: AtomicI64::new(0),
                name_service: Arc::new(NameService::new()),
                metrics: FabricMetrics::default(),
            }),
        }
    }

    /// Join a new member. Tasks addressed to it queue until a handler is set.
    pub fn join(&self, request: JoinRequest) -> Arc<FabricService> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let join_time = self.next_join_time();

        let mut member = Member::new(id, request.address).with_version(request.version);
        if let Some(name) = request.name {
            member = member.with_name(name);
        }
        let mut service_member = ServiceMember::new(member, join_time);
        if request.dynamic_management {
            service_member = service_member.with_config(DYNAMIC_MANAGEMENT_KEY, "true");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = Arc::new(Endpoint {
            member: service_member.clone(),
            inbound: tx,
            receiver: Mutex::new(Some(rx)),
            running: AtomicBool::new(true),
            handler: RwLock::new(None),
            listeners: RwLock::new(Vec::new()),
        });

        {
            let mut members = self.inner.members.write();
            for other in members.values() {
                other.deliver(Inbound::Joined(service_member.clone()));
            }
            members.insert(id, endpoint.clone());
        }
        self.inner.metrics.members_joined.fetch_add(1, Ordering::Relaxed);
        debug!(member_id = id, "Member joined {}", self.inner.config.service_name);

        Arc::new(FabricService {
            fabric: self.clone(),
            endpoint,
        })
    }

    /// Stop the member's service. Every remaining member, and the departing
    /// member itself, receives `member_left`.
    pub fn leave(&self, id: MemberId) -> bool {
        let endpoint = match self.inner.members.write().remove(&id) {
            Some(endpoint) => endpoint,
            None => return false,
        };
        endpoint.running.store(false, Ordering::SeqCst);
        self.inner.metrics.members_left.fetch_add(1, Ordering::Relaxed);

        let departed = endpoint.member.clone();
        if endpoint.receiver.lock().take().is_some() {
            // never started, drop queued tasks so callers see the departure
            trace!(member_id = id, "Dropping queue of unstarted member");
        } else {
            endpoint.deliver(Inbound::Left(departed.clone()));
        }

        for other in self.inner.members.read().values() {
            other.deliver(Inbound::Left(departed.clone()));
        }
        debug!(member_id = id, "Member left {}", self.inner.config.service_name);
        true
    }

    pub fn members(&self) -> Vec<ServiceMember> {
        self.inner
            .members
            .read()
            .values()
            .map(|e| e.member.clone())
            .collect()
    }

    pub fn name_service(&self) -> Arc<NameService> {
        self.inner.name_service.clone()
    }

    pub fn metrics(&self) -> &FabricMetrics {
        &self.inner.metrics
    }

    fn endpoint(&self, id: MemberId) -> Option<Arc<Endpoint>> {
        self.inner.members.read().get(&id).cloned()
    }

    fn next_join_time(&self) -> i64 {
        let now = current_time_millis();
        let previous = self
            .inner
            .last_join_millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    /// Queue a task on each target; unknown targets are reported as absent.
    fn dispatch(
        &self,
        from: MemberId,
        payload: &Bytes,
        targets: &[MemberId],
    ) -> Vec<(MemberId, Option<oneshot::Receiver<Result<Bytes>>>)> {
        targets
            .iter()
            .map(|&target| {
                let receiver = self.endpoint(target).and_then(|endpoint| {
                    let (tx, rx) = oneshot::channel();
                    let task = Inbound::Task {
                        ctx: DeliveryContext {
                            from,
                            on_service_thread: true,
                        },
                        payload: payload.clone(),
                        reply: tx,
                    };
                    endpoint.deliver(task).then_some(rx)
                });
                if receiver.is_some() {
                    self.inner.metrics.tasks_delivered.fetch_add(1, Ordering::Relaxed);
                }
                (target, receiver)
            })
            .collect()
    }
}

/// One member's view of the fabric.
pub struct FabricService {
    fabric: LocalFabric,
    endpoint: Arc<Endpoint>,
}

impl std::fmt::Debug for FabricService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabricService")
            .field("member", &self.endpoint.member.id())
            .field("running", &self.is_running())
            .finish()
    }
}

impl FabricService {
    pub fn fabric(&self) -> &LocalFabric {
        &self.fabric
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(TransportError::service_stopped(
                &self.fabric.inner.config.service_name,
            ))
        }
    }

    fn timeout_millis(&self) -> u64 {
        self.request_timeout().as_millis() as u64
    }
}

#[async_trait]
impl InvocationService for FabricService {
    fn service_name(&self) -> &str {
        &self.fabric.inner.config.service_name
    }

    fn local_member(&self) -> ServiceMember {
        self.endpoint.member.clone()
    }

    fn service_members(&self) -> Vec<ServiceMember> {
        self.fabric.members()
    }

    fn is_running(&self) -> bool {
        self.endpoint.running.load(Ordering::SeqCst)
    }

    fn request_timeout(&self) -> Duration {
        self.fabric.inner.config.request_timeout
    }

    fn set_task_handler(&self, handler: Arc<dyn TaskHandler>) {
        *self.endpoint.handler.write() = Some(handler);
        if let Some(receiver) = self.endpoint.receiver.lock().take() {
            tokio::spawn(run_service(self.endpoint.clone(), receiver));
        }
    }

    fn add_member_listener(&self, listener: Arc<dyn MemberListener>) {
        self.endpoint.listeners.write().push(listener);
    }

    fn name_service(&self) -> Arc<NameService> {
        self.fabric.name_service()
    }

    fn shutdown(&self) {
        self.fabric.leave(self.endpoint.member.id());
    }

    async fn query(&self, payload: Bytes, targets: &[MemberId]) -> Result<HashMap<MemberId, Bytes>> {
        self.ensure_running()?;
        let pending = self.fabric.dispatch(self.endpoint.member.id(), &payload, targets);

        let gather = futures::future::join_all(pending.into_iter().map(|(id, rx)| async move {
            match rx {
                Some(rx) => (id, rx.await.ok()),
                None => (id, None),
            }
        }));

        let replies = match tokio::time::timeout(self.request_timeout(), gather).await {
            Ok(replies) => replies,
            Err(_) => {
                self.fabric.inner.metrics.timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(TransportError::timeout("query", self.timeout_millis()));
            }
        };

        let mut results = HashMap::with_capacity(replies.len());
        for (id, reply) in replies {
            match reply {
                Some(Ok(bytes)) => {
                    results.insert(id, bytes);
                }
                Some(Err(e)) => return Err(e),
                None => {
                    self.fabric.inner.metrics.replies_lost.fetch_add(1, Ordering::Relaxed);
                    trace!(member_id = id, "No reply, member left");
                }
            }
        }
        Ok(results)
    }

    fn execute(
        &self,
        payload: Bytes,
        targets: &[MemberId],
        observer: Option<Arc<dyn InvocationObserver>>,
    ) -> Result<()> {
        self.ensure_running()?;
        let pending = self.fabric.dispatch(self.endpoint.member.id(), &payload, targets);
        let timeout = self.request_timeout();
        let timeout_ms = self.timeout_millis();
        let metrics_fabric = self.fabric.clone();

        tokio::spawn(async move {
            let mut replies: FuturesUnordered<_> = pending
                .into_iter()
                .map(|(id, rx)| async move {
                    let outcome = match rx {
                        None => Outcome::Left,
                        Some(rx) => match tokio::time::timeout(timeout, rx).await {
                            Ok(Ok(result)) => Outcome::Reply(result),
                            Ok(Err(_)) => Outcome::Left,
                            Err(_) => Outcome::TimedOut,
                        },
                    };
                    (id, outcome)
                })
                .collect();

            while let Some((id, outcome)) = replies.next().await {
                let metrics = &metrics_fabric.inner.metrics;
                match (outcome, &observer) {
                    (Outcome::Reply(Ok(bytes)), Some(observer)) => {
                        observer.member_completed(id, bytes).await
                    }
                    (Outcome::Reply(Err(e)), Some(observer)) => observer.member_failed(id, e).await,
                    (Outcome::Left, observer) => {
                        metrics.replies_lost.fetch_add(1, Ordering::Relaxed);
                        if let Some(observer) = observer {
                            observer.member_left(id).await;
                        }
                    }
                    (Outcome::TimedOut, observer) => {
                        metrics.timeouts.fetch_add(1, Ordering::Relaxed);
                        if let Some(observer) = observer {
                            observer
                                .member_failed(id, TransportError::timeout("execute", timeout_ms))
                                .await;
                        }
                    }
                    (Outcome::Reply(_), None) => {}
                }
            }

            if let Some(observer) = &observer {
                observer.invocation_completed().await;
            }
        });
        Ok(())
    }
}

enum Outcome {
    Reply(Result<Bytes>),
    Left,
    TimedOut,
}

async fn run_service(endpoint: Arc<Endpoint>, mut receiver: mpsc::UnboundedReceiver<Inbound>) {
    let local_id = endpoint.member.id();

    while let Some(item) = receiver.recv().await {
        match item {
            Inbound::Task { ctx, payload, reply } => {
                let handler = endpoint.handler.read().clone();
                let Some(handler) = handler else {
                    let _ = reply.send(Err(TransportError::service_stopped("no task handler")));
                    continue;
                };
                match handler.handle(ctx, payload).await {
                    TaskReply::Ready(result) => {
                        let _ = reply.send(result);
                    }
                    TaskReply::Deferred(deferred) => {
                        tokio::spawn(async move {
                            let result = deferred.await.unwrap_or_else(|_| {
                                Err(TransportError::protocol("deferred reply abandoned"))
                            });
                            let _ = reply.send(result);
                        });
                    }
                }
            }
            Inbound::Joined(member) => {
                let listeners = endpoint.listeners.read().clone();
                for listener in listeners {
                    listener.member_joined(&member).await;
                }
            }
            Inbound::Left(member) => {
                let listeners = endpoint.listeners.read().clone();
                for listener in listeners {
                    listener.member_left(&member).await;
                }
                if member.id() == local_id {
                    break;
                }
            }
        }
    }

    if endpoint.running.load(Ordering::SeqCst) {
        warn!(member_id = local_id, "Service task ended while member still running");
    }
}
