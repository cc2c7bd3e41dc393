//! Invocation service seams consumed by the management connector.

use crate::error::Result;
use crate::membership::{MemberListener, ServiceMember};
use crate::name_service::NameService;
use crate::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use types::MemberId;

/// Where and how a task was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryContext {
    pub from: MemberId,
    /// True when the handler runs on the member's service task, which must
    /// not wait on another member
    pub on_service_thread: bool,
}

/// Handler outcome: an immediate reply or one completed later through a
/// [`Continuation`].
pub enum TaskReply {
    Ready(Result<Bytes>),
    Deferred(oneshot::Receiver<Result<Bytes>>),
}

impl TaskReply {
    pub fn ok(bytes: Bytes) -> Self {
        TaskReply::Ready(Ok(bytes))
    }
}

/// Completion handle for a deferred reply.
#[derive(Debug)]
pub struct Continuation {
    tx: oneshot::Sender<Result<Bytes>>,
}

impl Continuation {
    pub fn new() -> (Self, TaskReply) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, TaskReply::Deferred(rx))
    }

    pub fn complete(self, reply: Bytes) {
        let _ = self.tx.send(Ok(reply));
    }

    pub fn fail(self, error: TransportError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Receives tasks addressed to the local member.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, ctx: DeliveryContext, payload: Bytes) -> TaskReply;
}

/// Per-member outcome of an asynchronous `execute`.
#[async_trait]
pub trait InvocationObserver: Send + Sync {
    async fn member_completed(&self, member: MemberId, reply: Bytes);

    async fn member_failed(&self, member: MemberId, error: TransportError);

    async fn member_left(&self, member: MemberId);

    /// Called once after every target reported
    async fn invocation_completed(&self);
}

/// Deliver-to-member task execution with membership events.
#[async_trait]
pub trait InvocationService: Send + Sync {
    fn service_name(&self) -> &str;

    fn local_member(&self) -> ServiceMember;

    /// Running members of this service, local member included
    fn service_members(&self) -> Vec<ServiceMember>;

    fn service_member(&self, id: MemberId) -> Option<ServiceMember> {
        self.service_members().into_iter().find(|m| m.id() == id)
    }

    fn is_running(&self) -> bool;

    fn request_timeout(&self) -> Duration;

    fn set_task_handler(&self, handler: Arc<dyn TaskHandler>);

    fn add_member_listener(&self, listener: Arc<dyn MemberListener>);

    fn name_service(&self) -> Arc<NameService>;

    /// Leave the service. Members see the departure and the local listeners
    /// are told the local member left.
    fn shutdown(&self);

    /// Run the task on every target and wait for the replies. Members that
    /// leave before replying are absent from the result.
    async fn query(&self, payload: Bytes, targets: &[MemberId]) -> Result<HashMap<MemberId, Bytes>>;

    /// Run the task on every target without waiting.
    fn execute(
        &self,
        payload: Bytes,
        targets: &[MemberId],
        observer: Option<Arc<dyn InvocationObserver>>,
    ) -> Result<()>;
}
