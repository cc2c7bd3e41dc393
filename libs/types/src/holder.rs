//! The serializable half of a listener subscription.

use crate::member::MemberId;
use crate::notification::{Notification, NotificationFilter};
use serde::{Deserialize, Serialize};

/// Subscription registered on an owning member on behalf of a listener that
/// lives on `member_id`. The owner only needs the id pair and the filter; the
/// listener itself never leaves the subscribing member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHolder {
    pub holder_id: i64,
    pub member_id: MemberId,
    pub filter: Option<NotificationFilter>,
}

impl RemoteHolder {
    pub fn new(holder_id: i64, member_id: MemberId, filter: Option<NotificationFilter>) -> Self {
        Self {
            holder_id,
            member_id,
            filter,
        }
    }

    pub fn accepts(&self, notification: &Notification) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |f| f.is_enabled(notification))
    }
}
