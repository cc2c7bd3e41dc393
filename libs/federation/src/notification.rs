//! Listener subscriptions attached to models.
//!
//! A [`NotificationHandler`] holds the listeners registered on this member.
//! A [`RemoteNotificationHandler`] lives on the owning member and records
//! which other members subscribed, so notifications are relayed once per
//! interested member and filtered again on arrival.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::trace;
use types::{MemberId, Notification, NotificationFilter, RemoteHolder, Value};

static NEXT_HOLDER_ID: AtomicI64 = AtomicI64::new(1);

/// Receives notifications emitted by a model.
pub trait NotificationListener: Send + Sync {
    fn handle_notification(&self, notification: &Notification, handback: Option<&Value>);
}

/// Relays notifications of a local model to subscribed members.
pub trait NotificationRelay: Send + Sync {
    fn relay(&self, name: &str, notification: &Notification, members: &[MemberId]);
}

/// Listener, filter and handback registered together.
#[derive(Clone)]
pub struct ListenerHolder {
    id: i64,
    listener: Arc<dyn NotificationListener>,
    filter: Option<NotificationFilter>,
    handback: Option<Value>,
}

impl ListenerHolder {
    pub fn new(
        listener: Arc<dyn NotificationListener>,
        filter: Option<NotificationFilter>,
        handback: Option<Value>,
    ) -> Self {
        Self {
            id: NEXT_HOLDER_ID.fetch_add(1, Ordering::Relaxed),
            listener,
            filter,
            handback,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn filter(&self) -> Option<&NotificationFilter> {
        self.filter.as_ref()
    }

    pub fn is_listener(&self, listener: &Arc<dyn NotificationListener>) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.listener) as *const (),
            Arc::as_ptr(listener) as *const (),
        )
    }

    /// Same listener, filter and handback
    pub fn matches(
        &self,
        listener: &Arc<dyn NotificationListener>,
        filter: Option<&NotificationFilter>,
        handback: Option<&Value>,
    ) -> bool {
        self.is_listener(listener) && self.filter.as_ref() == filter && self.handback.as_ref() == handback
    }

    /// Deliver if the filter accepts; returns whether it was delivered.
    pub fn deliver(&self, notification: &Notification) -> bool {
        let accepted = self
            .filter
            .as_ref()
            .map_or(true, |f| f.is_enabled(notification));
        if accepted {
            self.listener
                .handle_notification(notification, self.handback.as_ref());
        }
        accepted
    }

    /// The part of this subscription the owning member needs.
    pub fn to_remote(&self, member_id: MemberId) -> RemoteHolder {
        RemoteHolder::new(self.id, member_id, self.filter.clone())
    }
}

impl fmt::Debug for ListenerHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHolder")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("handback", &self.handback)
            .finish()
    }
}

/// Listeners registered on this member for one model.
#[derive(Default)]
pub struct NotificationHandler {
    holders: RwLock<Vec<ListenerHolder>>,
}

impl NotificationHandler {
    pub fn add(&self, holder: ListenerHolder) {
        self.holders.write().push(holder);
    }

    /// Remove every registration of the listener.
    pub fn remove_listener(&self, listener: &Arc<dyn NotificationListener>) -> Vec<ListenerHolder> {
        let mut holders = self.holders.write();
        let (removed, kept): (Vec<_>, Vec<_>) =
            holders.drain(..).partition(|h| h.is_listener(listener));
        *holders = kept;
        removed
    }

    /// Remove the one registration with this listener, filter and handback.
    pub fn remove_exact(
        &self,
        listener: &Arc<dyn NotificationListener>,
        filter: Option<&NotificationFilter>,
        handback: Option<&Value>,
    ) -> Option<ListenerHolder> {
        let mut holders = self.holders.write();
        let index = holders
            .iter()
            .position(|h| h.matches(listener, filter, handback))?;
        Some(holders.remove(index))
    }

    pub fn holders(&self) -> Vec<ListenerHolder> {
        self.holders.read().clone()
    }

    /// Take every holder, leaving the handler empty.
    pub fn drain(&self) -> Vec<ListenerHolder> {
        std::mem::take(&mut *self.holders.write())
    }

    pub fn is_empty(&self) -> bool {
        self.holders.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.holders.read().len()
    }

    /// Deliver to every accepting holder; returns the number reached.
    pub fn dispatch(&self, notification: &Notification) -> usize {
        let holders = self.holders.read().clone();
        holders.iter().filter(|h| h.deliver(notification)).count()
    }
}

/// Subscriptions held on the owning member on behalf of other members.
pub struct RemoteNotificationHandler {
    holders: RwLock<BTreeMap<(MemberId, i64), RemoteHolder>>,
    relay: Arc<dyn NotificationRelay>,
}

impl RemoteNotificationHandler {
    pub fn new(relay: Arc<dyn NotificationRelay>) -> Self {
        Self {
            holders: RwLock::new(BTreeMap::new()),
            relay,
        }
    }

    pub fn add(&self, holder: RemoteHolder) {
        self.holders
            .write()
            .insert((holder.member_id, holder.holder_id), holder);
    }

    pub fn remove(&self, member_id: MemberId, holder_ids: &[i64]) -> usize {
        let mut holders = self.holders.write();
        holder_ids
            .iter()
            .filter(|id| holders.remove(&(member_id, **id)).is_some())
            .count()
    }

    /// Drop every subscription of a member.
    pub fn unsubscribe_member(&self, member_id: MemberId) -> usize {
        let mut holders = self.holders.write();
        let before = holders.len();
        holders.retain(|(member, _), _| *member != member_id);
        before - holders.len()
    }

    pub fn clear(&self) {
        self.holders.write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.holders.read().is_empty()
    }

    pub fn holders(&self) -> Vec<RemoteHolder> {
        self.holders.read().values().cloned().collect()
    }

    /// Members with at least one holder accepting the notification.
    pub fn interested_members(&self, notification: &Notification) -> BTreeSet<MemberId> {
        self.holders
            .read()
            .values()
            .filter(|h| h.accepts(notification))
            .map(|h| h.member_id)
            .collect()
    }

    pub fn dispatch(&self, name: &str, notification: &Notification) -> usize {
        let members: Vec<MemberId> = self.interested_members(notification).into_iter().collect();
        if !members.is_empty() {
            trace!(name, members = ?members, "Relaying notification");
            self.relay.relay(name, notification, &members);
        }
        members.len()
    }
}
