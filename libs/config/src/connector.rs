//! Connector settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// When a cached remote snapshot is refreshed from its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefreshPolicy {
    /// Synchronous fetch once the snapshot has expired
    #[serde(rename = "refresh-expired")]
    Expired,
    /// Like `Expired`, and also refresh other active expired models
    #[serde(rename = "refresh-ahead")]
    Ahead,
    /// Refresh in the background, readers see the last snapshot
    #[serde(rename = "refresh-behind")]
    Behind,
    /// Readers wait for any in-flight fetch to finish
    #[serde(rename = "refresh-onquery")]
    OnQuery,
}

impl RefreshPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshPolicy::Expired => "refresh-expired",
            RefreshPolicy::Ahead => "refresh-ahead",
            RefreshPolicy::Behind => "refresh-behind",
            RefreshPolicy::OnQuery => "refresh-onquery",
        }
    }
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        RefreshPolicy::Ahead
    }
}

impl fmt::Display for RefreshPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "refresh-expired" => Ok(RefreshPolicy::Expired),
            "refresh-ahead" => Ok(RefreshPolicy::Ahead),
            "refresh-behind" => Ok(RefreshPolicy::Behind),
            "refresh-onquery" => Ok(RefreshPolicy::OnQuery),
            other => Err(format!("unknown refresh policy '{}'", other)),
        }
    }
}

/// Which members host an MBean server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ManagedNodes {
    /// No MBean server; beans are managed remotely
    #[default]
    None,
    /// MBean server for local beans only, no federation
    LocalOnly,
    /// MBean server for the beans of other members only
    RemoteOnly,
    /// MBean server managing every member
    All,
    /// Manage only while this member is the dynamic senior
    Dynamic,
}

impl ManagedNodes {
    /// Starts out as a managing member.
    pub fn is_managing(&self) -> bool {
        matches!(self, ManagedNodes::All | ManagedNodes::RemoteOnly)
    }

    /// The MBean view also shows this member's own beans.
    pub fn shows_local_beans(&self) -> bool {
        !matches!(self, ManagedNodes::RemoteOnly)
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ManagedNodes::Dynamic)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub refresh_policy: RefreshPolicy,
    /// Snapshot time-to-live
    pub refresh_timeout_millis: u64,
    /// Bounded wait for an in-flight fetch, and the remote request timeout
    pub refresh_request_timeout_millis: u64,
    /// Wait used when a reader needs a fetch it just started to finish
    pub attribute_timeout_millis: u64,
    pub managed_nodes: ManagedNodes,
    pub allow_remote_management: bool,
    /// Host the connector endpoint binds to; `0.0.0.0` binds every address
    pub connector_host: String,
    pub connector_port: u16,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            refresh_policy: RefreshPolicy::default(),
            refresh_timeout_millis: 1000,
            refresh_request_timeout_millis: 250,
            attribute_timeout_millis: 250,
            managed_nodes: ManagedNodes::default(),
            allow_remote_management: true,
            connector_host: "0.0.0.0".to_string(),
            connector_port: 9000,
        }
    }
}

impl ConnectorConfig {
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_millis)
    }

    pub fn refresh_request_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_request_timeout_millis)
    }

    pub fn attribute_timeout(&self) -> Duration {
        Duration::from_millis(self.attribute_timeout_millis)
    }

    /// Runs a connector at all: exports its beans, or may manage others.
    /// Dynamic management implies remote management.
    pub fn is_federated(&self) -> bool {
        self.exports_beans() || self.managed_nodes.is_managing()
    }

    /// Global beans of this member are pushed to managing members.
    pub fn exports_beans(&self) -> bool {
        self.allow_remote_management || self.managed_nodes.is_dynamic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_strings() {
        for policy in [
            RefreshPolicy::Expired,
            RefreshPolicy::Ahead,
            RefreshPolicy::Behind,
            RefreshPolicy::OnQuery,
        ] {
            assert_eq!(policy.as_str().parse::<RefreshPolicy>().unwrap(), policy);
        }
        assert!("refresh-sometimes".parse::<RefreshPolicy>().is_err());
    }

    #[test]
    fn test_managed_nodes() {
        assert!(ManagedNodes::All.is_managing());
        assert!(!ManagedNodes::Dynamic.is_managing());
        assert!(ManagedNodes::Dynamic.is_dynamic());
        assert!(!ManagedNodes::RemoteOnly.shows_local_beans());
    }

    #[test]
    fn test_federation_modes() {
        let mut config = ConnectorConfig {
            managed_nodes: ManagedNodes::LocalOnly,
            allow_remote_management: false,
            ..Default::default()
        };
        assert!(!config.is_federated());

        config.managed_nodes = ManagedNodes::Dynamic;
        assert!(config.is_federated());
        assert!(config.exports_beans());

        config.managed_nodes = ManagedNodes::All;
        assert!(config.is_federated());
        assert!(!config.exports_beans());
    }
}
