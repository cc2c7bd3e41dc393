//! Reaction to members joining and leaving the management service.

use super::Connector;
use crate::mbean_server::MBeanView;
use crate::model::ModelRef;
use async_trait::async_trait;
use network::{MemberListener, ServiceMember};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use types::{names, MemberId};

pub(crate) struct ConnectorMembership {
    connector: Weak<Connector>,
}

impl ConnectorMembership {
    pub(crate) fn new(connector: Weak<Connector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl MemberListener for ConnectorMembership {
    async fn member_joined(&self, member: &ServiceMember) {
        if let Some(connector) = self.connector.upgrade() {
            connector.on_member_joined(member);
        }
    }

    async fn member_left(&self, member: &ServiceMember) {
        let Some(connector) = self.connector.upgrade() else {
            return;
        };
        if member.id() == connector.local_member_id() {
            connector.reset();
        } else {
            connector.on_member_left(member.id());
        }
    }
}

impl Connector {
    /// A joining member learns the endpoint from the member that owns it.
    fn on_member_joined(&self, member: &ServiceMember) {
        if member.id() == self.local_member_id() {
            return;
        }
        let owns = self.owns_endpoint.load(Ordering::SeqCst);
        if owns && self.published_endpoint().url.is_some() {
            debug!(member = member.id(), "Publishing management endpoint to new member");
            self.publish_to(&[member.id()]);
        }
    }

    fn on_member_left(&self, departed: MemberId) {
        if self.remote_servers.write().remove(&departed).is_some() {
            info!(member = departed, "Management server left");
        }

        let view = self.view();
        self.purge_models_of(departed, view.as_deref());
        for entry in self.local_registry.iter() {
            entry.value().unsubscribe_member(departed);
        }

        if self.config.managed_nodes.is_dynamic() && !self.is_managing() {
            let Some(connector) = self.self_ref.upgrade() else {
                return;
            };
            // membership changes are applied before listeners run
            self.dispatcher.submit(async move {
                connector.rearbitrate();
            });
        }
    }

    /// Drop the cached models owned by a departed member.
    fn purge_models_of(&self, departed: MemberId, view: Option<&MBeanView>) {
        let owned: Vec<String> = self
            .remote_models
            .iter()
            .filter(|entry| entry.value().owner().id == departed)
            .map(|entry| entry.key().clone())
            .collect();

        for name in owned {
            let removed = self
                .remote_models
                .remove_if(&name, |_, model| model.owner().id == departed);
            if let (Some((_, model)), Some(view)) = (removed, view) {
                view.unregister(&name, Some(&ModelRef::Remote(model)));
            }
        }
        if let Some(view) = view {
            let pattern = format!("{}{}{}", names::KEY_NODE_ID, departed, names::WILDCARD_SUFFIX);
            let leftover = view.unregister(&pattern, None);
            if !leftover.is_empty() {
                debug!(member = departed, count = leftover.len(), "Removed MBeans of departed member");
            }
        }
    }

    /// Take over management when this member became the dynamic senior.
    fn rearbitrate(self: &Arc<Self>) {
        if self.is_managing() || !self.is_dynamic_senior() {
            return;
        }
        match self.assume_management() {
            Ok(()) => {
                if let Err(e) = self.announce() {
                    warn!(error = %e, "Re-announcement failed");
                }
            }
            Err(e) => warn!(error = %e, "Failed to assume management"),
        }
    }
}
