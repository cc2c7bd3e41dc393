//! Cached proxy of a bean owned by another member.
//!
//! The owner's state arrives as [`ModelSnapshot`]s. A snapshot that lands
//! while a reader is active (read within the last [`PAUSE_MILLIS`]) is parked
//! as `next` and promoted once the reader is done, so a burst of reads sees
//! one consistent snapshot.
//!
//! At most one fetch per model is in flight. The [`ExecuteMutex`] is taken
//! without waiting when a fetch is issued and released when the owner's
//! reply has been applied; readers that need the result wait on it with a
//! bound and fall back to the last snapshot.

use super::{filter_attributes, listener_not_found, remove_from, Model, ModelBase};
use crate::connector::Connector;
use crate::error::{ManagementError, Result};
use crate::notification::{ListenerHolder, NotificationListener};
use async_trait::async_trait;
use bytes::Bytes;
use codec::{ModelOp, ModelRequest, Task, TaskResponse};
use config::RefreshPolicy;
use network::{InvocationObserver, TransportError};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, trace};
use types::{
    current_time_millis, Filter, MBeanInfo, Member, MemberId, ModelKind, ModelSnapshot,
    NotificationFilter, Value,
};

/// Window after a read during which incoming snapshots are parked.
pub const PAUSE_MILLIS: i64 = 128;

/// How an [`ExecuteMutex`] acquisition went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexAcquire {
    /// Free on the first try
    NoWait,
    /// Acquired after waiting for the previous holder
    Wait,
    /// The holder kept it longer than the timeout; not acquired
    Timeout,
}

#[derive(Debug, Default)]
struct ExecState {
    executing: bool,
    last_start: Option<Instant>,
}

/// Single in-flight execution guard with a bounded wait.
///
/// The timeout is measured from when the current holder started, not from
/// when the caller began waiting.
#[derive(Debug, Default)]
pub struct ExecuteMutex {
    state: Mutex<ExecState>,
    released: Notify,
}

impl ExecuteMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire, waiting at most until the holder has run for `timeout`.
    /// Returns the outcome and whether the caller had to wait.
    pub async fn acquire(&self, timeout: Duration) -> (MutexAcquire, bool) {
        let mut waited = false;
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let remaining = {
                let mut state = self.state.lock();
                if !state.executing {
                    state.executing = true;
                    if !waited {
                        state.last_start = Some(Instant::now());
                    }
                    let outcome = if waited {
                        MutexAcquire::Wait
                    } else {
                        MutexAcquire::NoWait
                    };
                    return (outcome, waited);
                }
                let elapsed = state
                    .last_start
                    .map_or(Duration::ZERO, |start| start.elapsed());
                if elapsed >= timeout {
                    return (MutexAcquire::Timeout, waited);
                }
                timeout - elapsed
            };

            waited = true;
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    /// Acquire only if free.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.executing {
            return false;
        }
        state.executing = true;
        state.last_start = Some(Instant::now());
        true
    }

    pub fn release(&self) {
        self.state.lock().executing = false;
        self.released.notify_waiters();
    }

    pub fn is_executing(&self) -> bool {
        self.state.lock().executing
    }
}

#[derive(Debug, Default)]
struct SnapshotState {
    current: Option<ModelSnapshot>,
    next: Option<ModelSnapshot>,
    accessed: bool,
    access_time: i64,
}

impl SnapshotState {
    fn is_active(&self, now: i64) -> bool {
        now < self.access_time + PAUSE_MILLIS
    }

    fn promote(&mut self) {
        if let Some(next) = self.next.take() {
            self.current = Some(next);
        }
    }
}

/// Model whose bean is owned by another member.
pub struct RemoteModel {
    base: ModelBase,
    owner: RwLock<Member>,
    state: Mutex<SnapshotState>,
    exec: ExecuteMutex,
    connector: Weak<Connector>,
}

impl RemoteModel {
    pub fn new(name: impl Into<String>, owner: Member, connector: Weak<Connector>) -> Self {
        Self {
            base: ModelBase::new(name),
            owner: RwLock::new(owner),
            state: Mutex::new(SnapshotState::default()),
            exec: ExecuteMutex::new(),
            connector,
        }
    }

    pub fn owner(&self) -> Member {
        self.owner.read().clone()
    }

    /// Point the model at a new owner; returns whether it changed.
    pub fn set_owner(&self, owner: Member) -> bool {
        let mut current = self.owner.write();
        if current.id == owner.id {
            *current = owner;
            return false;
        }
        *current = owner;
        true
    }

    pub fn is_accessed(&self) -> bool {
        self.state.lock().accessed
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().is_active(current_time_millis())
    }

    pub fn execute_mutex(&self) -> &ExecuteMutex {
        &self.exec
    }

    /// Last snapshot, including a parked one.
    pub fn latest_snapshot(&self) -> Option<ModelSnapshot> {
        let state = self.state.lock();
        state.next.clone().or_else(|| state.current.clone())
    }

    fn connector(&self) -> Result<Arc<Connector>> {
        self.connector.upgrade().ok_or(ManagementError::ServiceStopped)
    }

    async fn acquire(&self, connector: &Connector, timeout: Duration) -> MutexAcquire {
        let (outcome, waited) = self.exec.acquire(timeout).await;
        if outcome == MutexAcquire::Timeout && waited {
            connector.stats().record_timeout();
        }
        outcome
    }

    /// Current snapshot, promoting a parked one once no reader is active.
    pub async fn get_snapshot(&self) -> Option<ModelSnapshot> {
        let promote = {
            let state = self.state.lock();
            state.next.is_some() && !state.is_active(current_time_millis())
        };
        if promote {
            if let Ok(connector) = self.connector() {
                let outcome = self
                    .acquire(&connector, connector.config().attribute_timeout())
                    .await;
                self.state.lock().promote();
                if outcome != MutexAcquire::Timeout {
                    self.exec.release();
                }
            }
        }
        self.state.lock().current.clone()
    }

    /// Apply a snapshot from the owner.
    pub fn set_snapshot(&self, mut snapshot: ModelSnapshot) {
        let now = current_time_millis();
        snapshot.stamp_refresh_time(now);

        let mut state = self.state.lock();
        if state.is_active(now) {
            state.next = Some(snapshot);
        } else {
            state.current = Some(snapshot);
            state.next = None;
        }
    }

    /// Expired and no fetch in flight.
    pub fn is_refresh_required(&self, ttl: Duration) -> bool {
        let expired = {
            let state = self.state.lock();
            match state.next.as_ref().or(state.current.as_ref()) {
                Some(snapshot) => {
                    snapshot.is_expired(ttl.as_millis() as u64, current_time_millis())
                }
                None => return false,
            }
        };
        expired && !self.exec.is_executing()
    }

    /// Start a background fetch unless one is in flight.
    pub fn invoke_remote_async(self: &Arc<Self>) -> bool {
        if !self.exec.try_acquire() {
            return false;
        }
        if self.issue_refresh().is_none() {
            self.exec.release();
            return false;
        }
        true
    }

    fn issue_refresh(self: &Arc<Self>) -> Option<()> {
        let connector = self.connector.upgrade()?;
        let service = connector.service()?;
        let request = ModelRequest::refresh(connector.local_member_id(), self.base.name());
        let payload = match Task::from(request).encode() {
            Ok(payload) => payload,
            Err(e) => {
                debug!(name = self.base.name(), error = %e, "Failed to encode refresh");
                return None;
            }
        };
        let owner = self.owner.read().id;
        let observer = Arc::new(RefreshObserver {
            model: self.clone(),
        });
        match service.execute(payload, &[owner], Some(observer)) {
            Ok(()) => {
                trace!(name = self.base.name(), owner, "Refresh issued");
                Some(())
            }
            Err(e) => {
                debug!(name = self.base.name(), error = %e, "Refresh not issued");
                None
            }
        }
    }

    /// Fetch and wait for the result, bounded by the attribute timeout.
    pub async fn fetch_snapshot(self: &Arc<Self>) -> Result<Option<ModelSnapshot>> {
        let connector = self.connector()?;
        self.invoke_remote_async();

        let outcome = self
            .acquire(&connector, connector.config().attribute_timeout())
            .await;
        let snapshot = {
            let mut state = self.state.lock();
            if !state.is_active(current_time_millis()) {
                state.promote();
            }
            state.current.clone()
        };
        if outcome != MutexAcquire::Timeout {
            self.exec.release();
        }
        Ok(snapshot)
    }

    /// Run a get, set or invoke on the owner and apply the returned
    /// snapshot. The owner's result value, if any, is returned.
    pub async fn invoke_remote(
        &self,
        op: ModelOp,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Option<Value>> {
        let acquired = self.exec.try_acquire();
        let result = self.query_owner(op, method, params).await;
        if acquired {
            self.exec.release();
        }
        result
    }

    async fn query_owner(
        &self,
        op: ModelOp,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Option<Value>> {
        let connector = self.connector()?;
        let service = connector.service().ok_or(ManagementError::ServiceStopped)?;
        let request = ModelRequest::operation(
            connector.local_member_id(),
            self.base.name(),
            op,
            method,
            params,
        );
        let payload = Task::from(request).encode()?;
        let owner = self.owner.read().id;

        let replies = service
            .query(payload, &[owner])
            .await
            .map_err(|e| match e {
                TransportError::Timeout { timeout_ms, .. } => ManagementError::timeout(
                    "Timeout occurred when executing remote method",
                    timeout_ms,
                ),
                other => other.into(),
            })?;
        let Some(bytes) = replies.get(&owner) else {
            return Ok(None);
        };

        match TaskResponse::decode(bytes)? {
            TaskResponse::Model(None) => Ok(None),
            TaskResponse::Model(Some(reply)) => {
                let value = match reply.result {
                    Some(Err(failure)) => return Err(failure.into()),
                    Some(Ok(value)) => Some(value),
                    None => None,
                };
                if op == ModelOp::Invoke {
                    self.state.lock().access_time = 0;
                }
                self.set_snapshot(reply.snapshot);
                Ok(value)
            }
            TaskResponse::Failure(failure) => Err(failure.into()),
            other => Err(ManagementError::illegal_state(format!(
                "Unexpected {} reply for MBean {}",
                other.variant_name(),
                self.base.name()
            ))),
        }
    }

    /// Snapshot that satisfies the configured refresh policy.
    pub async fn ensure_fresh_snapshot(self: &Arc<Self>) -> Result<ModelSnapshot> {
        let connector = self.connector()?;
        let config = connector.config();
        let ttl = config.refresh_timeout();

        if config.refresh_policy == RefreshPolicy::OnQuery {
            if self.is_refresh_required(ttl) && self.invoke_remote_async() {
                connector.stats().record_refresh();
            }
            let outcome = self
                .acquire(&connector, config.refresh_request_timeout())
                .await;
            if outcome != MutexAcquire::Timeout {
                self.exec.release();
            }
        } else if self.is_refresh_required(ttl) {
            let stats = connector.stats();
            stats.record_refresh();
            if !self.is_accessed() {
                stats.record_excess();
            }
            match config.refresh_policy {
                RefreshPolicy::Expired => {
                    self.fetch_snapshot().await?;
                }
                RefreshPolicy::Ahead => {
                    self.fetch_snapshot().await?;
                    connector.refresh_active_models();
                }
                RefreshPolicy::Behind => {
                    if self.invoke_remote_async() {
                        stats.record_prediction();
                    }
                }
                RefreshPolicy::OnQuery => {}
            }
        }

        if self.latest_snapshot().is_none() {
            self.fetch_snapshot().await?;
        }
        self.get_snapshot().await.ok_or_else(|| {
            ManagementError::illegal_state(format!(
                "No snapshot available for MBean {} from member {}",
                self.base.name(),
                self.owner.read().id
            ))
        })
    }

    pub async fn get_attribute(self: &Arc<Self>, attribute: &str) -> Result<Value> {
        let snapshot = self.ensure_fresh_snapshot().await?;
        let key = attribute
            .strip_prefix("is")
            .or_else(|| attribute.strip_prefix("get"))
            .filter(|rest| !rest.is_empty())
            .unwrap_or(attribute);
        self.mark_accessed();

        snapshot
            .attribute(key)
            .cloned()
            .ok_or_else(|| ManagementError::unknown_attribute(attribute, self.base.name()))
    }

    pub async fn get_attributes(
        self: &Arc<Self>,
        filter: Option<&Filter>,
    ) -> Result<BTreeMap<String, Value>> {
        let snapshot = self.ensure_fresh_snapshot().await?;
        self.mark_accessed();
        Ok(filter_attributes(snapshot.attributes, filter))
    }

    fn mark_accessed(&self) {
        let mut state = self.state.lock();
        state.accessed = true;
        state.access_time = current_time_millis();
    }

    pub async fn set_attribute(&self, attribute: &str, value: Value) -> Result<()> {
        self.invoke_remote(ModelOp::Set, attribute, vec![value])
            .await
            .map(|_| ())
    }

    pub async fn invoke(&self, operation: &str, params: Vec<Value>) -> Result<Value> {
        Ok(self
            .invoke_remote(ModelOp::Invoke, operation, params)
            .await?
            .unwrap_or_default())
    }

    pub async fn mbean_info(&self) -> Result<MBeanInfo> {
        let snapshot = match self.get_snapshot().await {
            Some(snapshot) => snapshot,
            None => return Err(ManagementError::instance_not_found(self.base.name())),
        };
        Ok(MBeanInfo {
            class_name: snapshot.kind.model_name().to_string(),
            description: format!("Owned by member {}", self.owner.read().id),
            attributes: snapshot.attributes.into_keys().collect(),
            operations: Vec::new(),
        })
    }

    /// Register a listener here and subscribe to the owner.
    pub fn add_listener(&self, holder: ListenerHolder) -> Result<()> {
        let connector = self.connector()?;
        let remote = holder.to_remote(connector.local_member_id());
        self.base.ensure_handler().add(holder);
        connector.subscribe(self.base.name(), self.owner.read().id, remote)
    }

    pub fn remove_listener(
        &self,
        listener: &Arc<dyn NotificationListener>,
        exact: Option<(Option<&NotificationFilter>, Option<&Value>)>,
    ) -> Result<usize> {
        let removed = remove_from(&self.base, listener, exact);
        if removed.is_empty() {
            return Err(listener_not_found(self.base.name()));
        }
        let ids: Vec<i64> = removed.iter().map(ListenerHolder::id).collect();
        if let Ok(connector) = self.connector() {
            connector.unsubscribe(self.base.name(), self.owner.read().id, ids);
        }
        Ok(removed.len())
    }

    /// Take every listener and drop the subscriptions held by the owner.
    pub fn release_listeners(&self) -> Vec<ListenerHolder> {
        let holders = self
            .base
            .handler()
            .map(|handler| handler.drain())
            .unwrap_or_default();
        if !holders.is_empty() {
            if let Ok(connector) = self.connector() {
                let ids = holders.iter().map(ListenerHolder::id).collect();
                connector.unsubscribe(self.base.name(), self.owner.read().id, ids);
            }
        }
        holders
    }

    /// Subscribe every local listener again, after an owner change.
    pub fn resubscribe(&self) {
        let Some(handler) = self.base.handler() else {
            return;
        };
        let Ok(connector) = self.connector() else {
            return;
        };
        let owner = self.owner.read().id;
        let local_id = connector.local_member_id();
        for holder in handler.holders() {
            if let Err(e) = connector.subscribe(self.base.name(), owner, holder.to_remote(local_id)) {
                debug!(name = self.base.name(), owner, error = %e, "Resubscribe failed");
            }
        }
    }
}

impl Model for RemoteModel {
    fn base(&self) -> &ModelBase {
        &self.base
    }

    fn kind(&self) -> ModelKind {
        self.latest_snapshot()
            .map_or(ModelKind::Wrapper, |snapshot| snapshot.kind)
    }
}

/// Applies the owner's reply to a background refresh.
struct RefreshObserver {
    model: Arc<RemoteModel>,
}

#[async_trait]
impl InvocationObserver for RefreshObserver {
    async fn member_completed(&self, member: MemberId, reply: Bytes) {
        match TaskResponse::decode(&reply) {
            Ok(TaskResponse::Model(Some(reply))) => self.model.set_snapshot(reply.snapshot),
            Ok(TaskResponse::Model(None)) => {
                debug!(name = self.model.name(), member, "MBean is no longer registered on owner");
            }
            Ok(other) => {
                debug!(name = self.model.name(), member, reply = other.variant_name(), "Unexpected refresh reply");
            }
            Err(e) => debug!(name = self.model.name(), member, error = %e, "Undecodable refresh reply"),
        }
    }

    async fn member_failed(&self, member: MemberId, error: TransportError) {
        debug!(name = self.model.name(), member, error = %error, "Refresh failed");
    }

    async fn member_left(&self, member: MemberId) {
        trace!(name = self.model.name(), member, "Owner left during refresh");
    }

    async fn invocation_completed(&self) {
        self.model.exec.release();
    }
}
