//! Functions a member can ship to a managing member for execution against
//! its MBean view.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagementFunction {
    /// Names matching the pattern, as a list of text values
    QueryNames { pattern: String },
    /// Map of name to attribute value for every matching name
    CollectAttribute { pattern: String, attribute: String },
    /// Number of names matching the pattern
    CountModels { pattern: String },
}

impl ManagementFunction {
    pub fn pattern(&self) -> &str {
        match self {
            ManagementFunction::QueryNames { pattern }
            | ManagementFunction::CollectAttribute { pattern, .. }
            | ManagementFunction::CountModels { pattern } => pattern,
        }
    }
}
