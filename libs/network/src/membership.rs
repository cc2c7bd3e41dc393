//! Service membership as seen by the invocation service.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use types::{Member, MemberId};

/// Member config key carrying the dynamic management flag.
pub const DYNAMIC_MANAGEMENT_KEY: &str = "management.dynamic";

/// A member of one invocation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMember {
    pub member: Member,
    /// Unique per service; the oldest member has the smallest value
    pub join_time_millis: i64,
    /// Service-scoped member configuration
    pub config: BTreeMap<String, String>,
}

impl ServiceMember {
    pub fn new(member: Member, join_time_millis: i64) -> Self {
        Self {
            member,
            join_time_millis,
            config: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> MemberId {
        self.member.id
    }

    pub fn is_dynamic_management(&self) -> bool {
        self.config
            .get(DYNAMIC_MANAGEMENT_KEY)
            .map(|v| v == "true")
            .unwrap_or(false)
    }
}

impl fmt::Display for ServiceMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} joined at {}", self.member, self.join_time_millis)
    }
}

/// The oldest dynamic-management member, if any.
pub fn dynamic_senior(members: &[ServiceMember]) -> Option<&ServiceMember> {
    members
        .iter()
        .filter(|m| m.is_dynamic_management())
        .min_by_key(|m| (m.join_time_millis, m.id()))
}

/// Membership events, delivered on the receiving member's service task.
///
/// `member_left` with the local member means the local service stopped.
#[async_trait]
pub trait MemberListener: Send + Sync {
    async fn member_joined(&self, member: &ServiceMember);

    async fn member_left(&self, member: &ServiceMember);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn member(id: MemberId, joined: i64, dynamic: bool) -> ServiceMember {
        let m = ServiceMember::new(Member::new(id, IpAddr::V4(Ipv4Addr::LOCALHOST)), joined);
        if dynamic {
            m.with_config(DYNAMIC_MANAGEMENT_KEY, "true")
        } else {
            m
        }
    }

    #[test]
    fn test_dynamic_senior_is_oldest_dynamic_member() {
        let members = vec![member(1, 10, false), member(2, 30, true), member(3, 20, true)];
        assert_eq!(dynamic_senior(&members).map(|m| m.id()), Some(3));
    }

    #[test]
    fn test_no_dynamic_members() {
        let members = vec![member(1, 10, false)];
        assert!(dynamic_senior(&members).is_none());
    }
}
