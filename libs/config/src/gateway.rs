//! Gateway settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Qualify names with `cluster=` and `member=` keys
    pub extended_mbean_name: bool,
    /// Mark every local model read-only
    pub read_only: bool,
    pub cluster_name: String,
    pub domain_name: String,
    /// Names containing any of these fragments are not registered
    pub exclude_filter: Vec<String>,
    pub custom_mbeans: Vec<CustomMBeanConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            extended_mbean_name: false,
            read_only: false,
            cluster_name: "cluster".to_string(),
            domain_name: "Coherence".to_string(),
            exclude_filter: Vec::new(),
            custom_mbeans: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Admission check applied to every registration
    pub fn admits(&self, name: &str) -> bool {
        !self
            .exclude_filter
            .iter()
            .any(|fragment| !fragment.is_empty() && name.contains(fragment.as_str()))
    }
}

/// A bean created from a named factory at gateway start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomMBeanConfig {
    pub name: String,
    /// Key of a factory registered with the gateway
    pub factory: String,
    #[serde(default)]
    pub local_only: bool,
    /// Reuse the same instance across gateway resets
    #[serde(default)]
    pub extend_lifecycle: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}
