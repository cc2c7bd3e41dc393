//! Receiving side of the federation protocol.

use super::Connector;
use crate::error::{ManagementError, Result};
use crate::model::{ModelRef, RemoteModel};
use async_trait::async_trait;
use bytes::Bytes;
use codec::{
    Announce, InvokeRemote, ModelOp, ModelReply, ModelRequest, Notify, Publish, Register,
    RemoteAction, Subscribe, SubscriptionChange, Task, TaskResponse, Unregister,
};
use dashmap::mapref::entry::Entry;
use network::{Continuation, DeliveryContext, TaskHandler, TaskReply, TransportError};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};
use types::{names, Value};

pub(crate) struct ConnectorHandler {
    connector: Weak<Connector>,
}

impl ConnectorHandler {
    pub(crate) fn new(connector: Weak<Connector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl TaskHandler for ConnectorHandler {
    async fn handle(&self, ctx: DeliveryContext, payload: Bytes) -> TaskReply {
        let Some(connector) = self.connector.upgrade() else {
            return TaskReply::Ready(Err(TransportError::service_stopped("management")));
        };
        let task = match Task::decode(&payload) {
            Ok(task) => task,
            Err(e) => {
                debug!(from = ctx.from, error = %e, "Dropping undecodable task");
                return TaskReply::Ready(Err(TransportError::protocol_with_source(
                    "Undecodable management task",
                    e,
                )));
            }
        };
        trace!(from = ctx.from, task = %task.kind(), "Handling task");

        match task {
            Task::Announce(task) => respond(connector.on_announcement(task)),
            Task::Register(task) => respond(connector.on_register(task)),
            Task::Unregister(task) => respond(connector.on_unregister(task)),
            Task::Notify(task) => respond(connector.on_notify(task)),
            Task::Subscribe(task) => respond(connector.on_subscribe(task)),
            Task::Publish(task) => respond(connector.on_publish(task)),
            Task::ModelRequest(task) => respond(connector.on_model_request(task)),
            Task::InvokeRemote(task) => connector.on_remote_invoke(ctx, task).await,
        }
    }
}

fn respond(response: TaskResponse) -> TaskReply {
    TaskReply::Ready(encode(&response))
}

fn encode(response: &TaskResponse) -> network::Result<Bytes> {
    response
        .encode()
        .map_err(|e| TransportError::protocol_with_source("Unencodable management reply", e))
}

impl Connector {
    /// Reply: whether this member is managing.
    fn on_announcement(&self, task: Announce) -> TaskResponse {
        debug!(from = task.member_from, managing = task.managing_node, "Announcement received");
        if task.managing_node {
            self.add_remote_server(task.member_from);
            self.register_all(&[task.member_from]);
        }
        TaskResponse::Bool(self.is_managing())
    }

    fn on_register(&self, task: Register) -> TaskResponse {
        let Some(owner) = self.member(task.member_from) else {
            debug!(from = task.member_from, "Registration from departed member ignored");
            return TaskResponse::Ack;
        };
        let view = self.view();

        for snapshot in task.snapshots {
            let name = snapshot.name.clone();
            let model = match self.remote_models.entry(name.clone()) {
                Entry::Occupied(entry) => {
                    let model = entry.get().clone();
                    let previous = model.owner().id;
                    if model.set_owner(owner.clone()) {
                        if !names::is_responsibility(&name) {
                            warn!(
                                name = %name,
                                previous,
                                current = owner.id,
                                "MBean registered by more than one member"
                            );
                        }
                        model.resubscribe();
                    }
                    model
                }
                Entry::Vacant(entry) => entry
                    .insert(Arc::new(RemoteModel::new(
                        name.clone(),
                        owner.clone(),
                        self.self_ref.clone(),
                    )))
                    .clone(),
            };

            if let Some(previous) = model.latest_snapshot() {
                if previous.kind != snapshot.kind {
                    warn!(
                        name = %name,
                        previous = %previous.kind,
                        current = %snapshot.kind,
                        "MBean re-registered with a different type"
                    );
                }
            }
            model.set_snapshot(snapshot);

            if let Some(view) = view.as_ref() {
                view.register(ModelRef::Remote(model));
            }
        }
        TaskResponse::Ack
    }

    fn on_unregister(&self, task: Unregister) -> TaskResponse {
        let (base, wildcard) = names::split_wildcard(&task.name);
        let candidates: Vec<String> = if wildcard {
            self.remote_models
                .iter()
                .filter(|entry| names::matches_pattern(entry.key(), base))
                .map(|entry| entry.key().clone())
                .collect()
        } else {
            vec![task.name.clone()]
        };

        let view = self.view();
        for name in candidates {
            let removed = self
                .remote_models
                .remove_if(&name, |_, model| model.owner().id == task.member_from);
            if let Some((_, model)) = removed {
                trace!(name = %name, owner = task.member_from, "Remote MBean unregistered");
                if let Some(view) = view.as_ref() {
                    view.unregister(&name, Some(&ModelRef::Remote(model)));
                }
            }
        }
        TaskResponse::Ack
    }

    fn on_notify(&self, task: Notify) -> TaskResponse {
        self.stats.record_notification();
        let Some(notification) = task.notification else {
            debug!(name = %task.name, from = task.member_from, "Dropping undecodable notification");
            return TaskResponse::Ack;
        };

        let target = self
            .remote_model(&task.name)
            .map(ModelRef::Remote)
            .or_else(|| self.view().and_then(|view| view.model(&task.name)));
        match target {
            Some(model) => self.dispatcher.submit(async move {
                model.handle_notification(&notification);
            }),
            None => debug!(name = %task.name, "Notification for unknown MBean"),
        }
        TaskResponse::Ack
    }

    fn on_subscribe(&self, task: Subscribe) -> TaskResponse {
        let Some(model) = self.local_model(&task.name) else {
            debug!(name = %task.name, from = task.member_from, "Subscription for unregistered MBean ignored");
            return TaskResponse::Ack;
        };
        match task.change {
            SubscriptionChange::Add(holder) => {
                trace!(name = %task.name, member = holder.member_id, holder = holder.holder_id, "Remote listener added");
                model.add_remote_listener(holder, || self.relay());
            }
            SubscriptionChange::Remove {
                member_id,
                holder_ids,
            } => {
                let removed = model.remove_remote_listeners(member_id, &holder_ids);
                trace!(name = %task.name, member = member_id, removed, "Remote listeners removed");
            }
        }
        TaskResponse::Ack
    }

    fn on_publish(&self, task: Publish) -> TaskResponse {
        if self.owns_endpoint.load(std::sync::atomic::Ordering::SeqCst) {
            trace!(from = task.member_from, "Ignoring publish, endpoint owned locally");
            return TaskResponse::Ack;
        }
        debug!(from = task.member_from, url = ?task.service_url, "Management endpoint published");
        let mut endpoint = self.endpoint.write();
        endpoint.url = task.service_url;
        endpoint.listen_addresses = task.listen_addresses;
        TaskResponse::Ack
    }

    /// Owner side of a remote model refresh or operation.
    fn on_model_request(&self, task: ModelRequest) -> TaskResponse {
        let Some(model) = self.local_model(&task.name) else {
            return TaskResponse::Model(None);
        };

        let result = task.method.as_deref().map(|method| {
            let outcome = match task.op {
                ModelOp::Get => model.get_attribute(method),
                ModelOp::Set => {
                    let value = task.params.into_iter().next().unwrap_or_default();
                    model.set_attribute(method, value).map(|_| Value::Null)
                }
                ModelOp::Invoke => model.invoke(method, &task.params),
            };
            outcome.map_err(|e| e.to_remote_failure())
        });

        TaskResponse::Model(Some(ModelReply {
            snapshot: model.snapshot(),
            result,
        }))
    }

    /// Serve an action addressed to this member as a management server.
    async fn on_remote_invoke(&self, ctx: DeliveryContext, task: InvokeRemote) -> TaskReply {
        if let Some(reason) = task.read_error.as_ref() {
            return respond(TaskResponse::Failure(
                ManagementError::illegal_argument(reason.clone()).to_remote_failure(),
            ));
        }
        if task.action == RemoteAction::FindOwner {
            return respond(TaskResponse::Owner(self.local_owner_of(&task.name)));
        }

        let defer = task.action == RemoteAction::Execute
            || (ctx.on_service_thread
                && self
                    .view()
                    .and_then(|view| view.model(&task.name))
                    .map_or(false, |model| matches!(model, ModelRef::Remote(_))));

        let Some(connector) = self.self_ref.upgrade() else {
            return TaskReply::Ready(Err(TransportError::service_stopped("management")));
        };
        if !defer {
            return respond(connector.dispatch_action(task).await);
        }

        let (continuation, reply) = Continuation::new();
        self.dispatcher.submit(async move {
            let response = connector.dispatch_action(task).await;
            match encode(&response) {
                Ok(bytes) => continuation.complete(bytes),
                Err(e) => continuation.fail(e),
            }
        });
        reply
    }

    /// Owner of a name known to this member, without asking anyone.
    fn local_owner_of(&self, name: &str) -> Option<types::MemberId> {
        if self.local_registry.contains_key(name) {
            return Some(self.local_member_id());
        }
        self.remote_model(name)
            .map(|model| model.owner().id)
            .filter(|id| self.member(*id).is_some())
    }

    async fn dispatch_action(&self, task: InvokeRemote) -> TaskResponse {
        match self.run_action(task).await {
            Ok(response) => response,
            Err(e) => {
                trace!(error = %e, "Remote action failed");
                TaskResponse::Failure(e.to_remote_failure())
            }
        }
    }

    async fn run_action(&self, task: InvokeRemote) -> Result<TaskResponse> {
        let view = self.view().ok_or_else(|| {
            ManagementError::illegal_state(format!(
                "Member {} is not a management server",
                self.local_member_id()
            ))
        })?;

        match task.action {
            RemoteAction::Get => {
                let model = view.require(&task.name)?;
                match task.member {
                    Some(attribute) => Ok(TaskResponse::Value(model.get_attribute(&attribute).await?)),
                    None => Ok(TaskResponse::Attributes(
                        model.get_attributes(task.filter.as_ref()).await?,
                    )),
                }
            }
            RemoteAction::Set => {
                let attribute = task
                    .member
                    .ok_or_else(|| ManagementError::illegal_argument("Missing attribute name"))?;
                let value = task.params.into_iter().next().unwrap_or_default();
                view.require(&task.name)?
                    .set_attribute(&attribute, value)
                    .await?;
                Ok(TaskResponse::Ack)
            }
            RemoteAction::Invoke => {
                let operation = task
                    .member
                    .ok_or_else(|| ManagementError::illegal_argument("Missing operation name"))?;
                let result = view
                    .require(&task.name)?
                    .invoke(&operation, task.params)
                    .await?;
                Ok(TaskResponse::Value(result))
            }
            RemoteAction::Check => Ok(TaskResponse::Bool(view.is_registered(&task.name))),
            RemoteAction::Query => {
                let names = view.query_names(&task.name, task.filter.as_ref());
                self.refresh_remote_models(&names);
                Ok(TaskResponse::Names(names))
            }
            RemoteAction::MBeanInfo => Ok(TaskResponse::Info(
                view.require(&task.name)?.mbean_info().await?,
            )),
            RemoteAction::Execute => {
                let function = task
                    .function
                    .ok_or_else(|| ManagementError::illegal_argument("Missing function"))?;
                Ok(TaskResponse::Value(view.evaluate(&function).await?))
            }
            RemoteAction::FindOwner => Ok(TaskResponse::Owner(self.local_owner_of(&task.name))),
        }
    }
}
