//! Layered loading: defaults, then a TOML file, then `MGMT_` environment
//! variables. Nested keys use a double underscore in the environment,
//! e.g. `MGMT_GATEWAY__READ_ONLY=true`.

use crate::connector::ConnectorConfig;
use crate::gateway::GatewayConfig;
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "MGMT";

/// Connector and gateway settings for one member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagementConfig {
    pub connector: ConnectorConfig,
    pub gateway: GatewayConfig,
}

impl ManagementConfig {
    /// Load from an optional file with environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = load_layered(path, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .context("Failed to build management configuration")?
            .try_deserialize()
            .context("Failed to deserialize management configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let connector = &self.connector;
        if connector.refresh_timeout_millis == 0 {
            bail!("connector.refresh_timeout_millis must be positive");
        }
        if connector.refresh_request_timeout_millis == 0 {
            bail!("connector.refresh_request_timeout_millis must be positive");
        }
        if connector.attribute_timeout_millis == 0 {
            bail!("connector.attribute_timeout_millis must be positive");
        }

        let gateway = &self.gateway;
        if gateway.domain_name.trim().is_empty() {
            bail!("gateway.domain_name must not be empty");
        }
        if gateway.cluster_name.trim().is_empty() {
            bail!("gateway.cluster_name must not be empty");
        }

        let mut seen = HashSet::new();
        for bean in &gateway.custom_mbeans {
            if bean.name.trim().is_empty() {
                bail!("custom mbean with factory '{}' has an empty name", bean.factory);
            }
            if !seen.insert(bean.name.as_str()) {
                bail!("custom mbean '{}' is configured more than once", bean.name);
            }
        }
        Ok(())
    }
}

/// Expand `~` and `$VAR` in a user supplied path.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw)
        .with_context(|| format!("Failed to expand path '{}'", raw))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

pub(crate) fn load_layered<T: DeserializeOwned>(path: Option<&Path>, prefix: &str) -> Result<T> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        info!("Loading management configuration from {:?}", path);
        builder = builder.add_source(File::from(path).required(true));
    } else {
        debug!("No configuration file given, using defaults");
    }

    builder = builder.add_source(
        Environment::with_prefix(prefix)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build().context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ManagedNodes, RefreshPolicy};
    use crate::gateway::CustomMBeanConfig;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = ManagementConfig::default();
        assert_eq!(cfg.connector.refresh_policy, RefreshPolicy::Ahead);
        assert_eq!(cfg.connector.refresh_timeout_millis, 1000);
        assert_eq!(cfg.connector.refresh_request_timeout_millis, 250);
        assert_eq!(cfg.connector.managed_nodes, ManagedNodes::None);
        assert_eq!(cfg.gateway.domain_name, "Coherence");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_toml_str() {
        let cfg = ManagementConfig::from_toml_str(
            r#"
            [connector]
            refresh_policy = "refresh-onquery"
            managed_nodes = "all"
            refresh_timeout_millis = 500

            [gateway]
            extended_mbean_name = true
            cluster_name = "prod"
            exclude_filter = ["type=Connection,"]

            [[gateway.custom_mbeans]]
            name = "type=Custom,name=audit"
            factory = "audit"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.connector.refresh_policy, RefreshPolicy::OnQuery);
        assert_eq!(cfg.connector.managed_nodes, ManagedNodes::All);
        assert_eq!(cfg.connector.refresh_timeout_millis, 500);
        assert_eq!(cfg.connector.attribute_timeout_millis, 250);
        assert!(cfg.gateway.extended_mbean_name);
        assert_eq!(cfg.gateway.cluster_name, "prod");
        assert_eq!(cfg.gateway.custom_mbeans.len(), 1);
        assert!(cfg.gateway.custom_mbeans[0].enabled);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut cfg = ManagementConfig::default();
        let bean = CustomMBeanConfig {
            name: "type=Custom".to_string(),
            factory: "f".to_string(),
            local_only: false,
            extend_lifecycle: false,
            enabled: true,
        };
        cfg.gateway.custom_mbeans = vec![bean.clone(), bean];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut cfg = ManagementConfig::default();
        cfg.connector.refresh_request_timeout_millis = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[connector]\nrefresh_policy = \"refresh-behind\"").unwrap();

        let cfg = ManagementConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.connector.refresh_policy, RefreshPolicy::Behind);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(ManagementConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_expand_path() {
        std::env::set_var("MGMT_TEST_DIR", "/opt/mgmt");
        let path = expand_path("$MGMT_TEST_DIR/cluster.toml").unwrap();
        assert_eq!(path, PathBuf::from("/opt/mgmt/cluster.toml"));
    }
}
