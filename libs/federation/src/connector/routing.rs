//! Requests routed to a managing member, and ownership lookups.

use super::Connector;
use crate::error::{ManagementError, Result};
use crate::model::RemoteModel;
use codec::{InvokeRemote, Subscribe, SubscriptionChange, Task, TaskResponse};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};
use types::{names, Member, MemberId, RemoteHolder};

/// Attempts per known management server before giving up.
const ATTEMPTS_PER_SERVER: usize = 4;

impl Connector {
    /// Send a request to one compatible management server and return its
    /// reply. A server that leaves before replying is dropped; one that
    /// times out is skipped for this request and another one is tried.
    pub async fn send_proxy_request(&self, request: InvokeRemote) -> Result<TaskResponse> {
        let service = self.service().ok_or(ManagementError::ServiceStopped)?;
        let attempts = self.remote_servers.read().len().max(1) * ATTEMPTS_PER_SERVER;
        let mut skipped = HashSet::new();
        let mut last_error = None;

        for attempt in 1..=attempts {
            let target = match self.choose_remote_server(&request, &skipped) {
                Ok(target) => target,
                Err(e) => return Err(last_error.unwrap_or(e)),
            };
            let payload = Task::from(request.clone()).encode()?;
            trace!(action = ?request.action, name = %request.name, target = target.id, attempt, "Proxy request");

            let replies = match service.query(payload, &[target.id]).await {
                Ok(replies) => replies,
                Err(e) if e.is_retryable() => {
                    debug!(target = target.id, error = %e, "Management server did not answer, trying another");
                    skipped.insert(target.id);
                    last_error = Some(e.into());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let Some(bytes) = replies.get(&target.id) else {
                debug!(target = target.id, "Management server left during request, retrying");
                self.remote_servers.write().remove(&target.id);
                continue;
            };
            return match TaskResponse::decode(bytes)? {
                TaskResponse::Failure(failure) => Err(failure.into()),
                response => Ok(response),
            };
        }
        Err(last_error.unwrap_or_else(|| {
            ManagementError::illegal_state(format!(
                "No management server answered after {} attempts",
                attempts
            ))
        }))
    }

    /// First known management server able to decode the request.
    fn choose_remote_server(
        &self,
        request: &InvokeRemote,
        skipped: &HashSet<MemberId>,
    ) -> Result<Member> {
        let servers: Vec<Member> = self
            .remote_servers()
            .into_iter()
            .filter(|server| !skipped.contains(&server.id))
            .collect();
        if servers.is_empty() {
            return Err(ManagementError::illegal_state(
                "No management server is available in the cluster",
            ));
        }
        let mut refusal = None;
        for server in servers {
            match request.ensure_supported_by(&server.version) {
                Ok(()) => return Ok(server),
                Err(e) => refusal = Some(e),
            }
        }
        Err(ManagementError::unsupported(
            refusal.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    /// Member owning a global name, if it is still running.
    pub async fn find_model_owner(&self, name: &str) -> Result<Option<Member>> {
        if let Some(id) = names::extract_member_id(name) {
            return Ok(self.member(id));
        }
        if self.local_registry.contains_key(name) {
            return Ok(self.local_member());
        }
        if let Some(model) = self.remote_model(name) {
            let owner = model.owner();
            if self.member(owner.id).is_some() {
                return Ok(Some(owner));
            }
        }
        if self.remote_servers.read().is_empty() {
            return Ok(None);
        }

        let request = InvokeRemote::find_owner(self.local_member_id(), name);
        match self.send_proxy_request(request).await? {
            TaskResponse::Owner(Some(id)) => Ok(self.member(id)),
            TaskResponse::Owner(None) => Ok(None),
            other => Err(ManagementError::illegal_state(format!(
                "Unexpected {} reply to an owner lookup",
                other.variant_name()
            ))),
        }
    }

    /// Cached model of a global name, created on first use.
    pub async fn ensure_remote_model(
        &self,
        name: &str,
        member: Option<MemberId>,
    ) -> Result<Arc<RemoteModel>> {
        if let Some(model) = self.remote_model(name) {
            return Ok(model);
        }
        let owner = match member {
            Some(id) => self.member(id),
            None => self.find_model_owner(name).await?,
        };
        let owner = owner.ok_or_else(|| {
            ManagementError::illegal_argument(format!(
                "Unable to locate owning Member for MBean {}",
                name
            ))
        })?;

        let model = self
            .remote_models
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RemoteModel::new(name, owner, self.self_ref.clone())))
            .clone();
        Ok(model)
    }

    /// Ask the owner to relay notifications of `name` to this member.
    pub(crate) fn subscribe(&self, name: &str, owner: MemberId, holder: RemoteHolder) -> Result<()> {
        if self.service().is_none() {
            return Err(ManagementError::ServiceStopped);
        }
        let task = Subscribe {
            member_from: self.local_member_id(),
            name: name.to_string(),
            change: SubscriptionChange::Add(holder),
        };
        self.execute(Task::from(task), &[owner], None);
        Ok(())
    }

    pub(crate) fn unsubscribe(&self, name: &str, owner: MemberId, holder_ids: Vec<i64>) {
        let task = Subscribe {
            member_from: self.local_member_id(),
            name: name.to_string(),
            change: SubscriptionChange::Remove {
                member_id: self.local_member_id(),
                holder_ids,
            },
        };
        self.execute(Task::from(task), &[owner], None);
    }
}
