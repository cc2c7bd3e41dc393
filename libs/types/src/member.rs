//! Cluster member identity as seen by the management layer.

use crate::version::ProductVersion;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Cluster-wide member id. Ids are positive and unique for the life of the
/// cluster.
pub type MemberId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    /// Optional logical member name, used by extended MBean naming
    pub name: Option<String>,
    pub address: IpAddr,
    pub version: ProductVersion,
}

impl Member {
    pub fn new(id: MemberId, address: IpAddr) -> Self {
        Self {
            id,
            name: None,
            address,
            version: ProductVersion::CURRENT,
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

    /// Member name, or an empty string when none was configured
    pub fn member_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Member(Id={}, Address={}", self.id, self.address)?;
        if let Some(name) = &self.name {
            write!(f, ", MemberName={}", name)?;
        }
        write!(f, ", Version={})", self.version)
    }
}
