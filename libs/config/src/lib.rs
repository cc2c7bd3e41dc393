//! # Management Configuration
//!
//! Typed configuration for the management layer of a cluster member.
//!
//! - [`ConnectorConfig`]: refresh policy, timeouts and which members manage
//! - [`GatewayConfig`]: naming, read-only mode, admission filter, custom beans
//! - [`ClusterConfig`]: a whole in-process cluster, used by the node binary
//!   and the end-to-end tests
//!
//! Configuration is layered: built-in defaults, then a TOML file, then
//! `MGMT_` environment variables (`MGMT_CONNECTOR__REFRESH_POLICY=refresh-behind`).
//!
//! ```rust
//! use config::{ManagementConfig, RefreshPolicy};
//!
//! let cfg = ManagementConfig::from_toml_str(r#"
//!     [connector]
//!     refresh_policy = "refresh-behind"
//! "#).unwrap();
//! assert_eq!(cfg.connector.refresh_policy, RefreshPolicy::Behind);
//! ```

pub mod cluster;
pub mod connector;
pub mod gateway;
pub mod loader;

pub use cluster::{ClusterConfig, NodeConfig};
pub use connector::{ConnectorConfig, ManagedNodes, RefreshPolicy};
pub use gateway::{CustomMBeanConfig, GatewayConfig};
pub use loader::{expand_path, ManagementConfig};
