//! Product versions used to gate federation features per member.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Five-part product version, e.g. `12.2.1.4.0`.
///
/// Ordering is lexicographic over the parts, which is what the feature
/// gates rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductVersion {
    parts: [u16; 5],
}

impl ProductVersion {
    /// First version able to answer name queries routed through a managing node.
    pub const QUERY_SUPPORT: ProductVersion = ProductVersion::new(12, 2, 1, 1, 0);

    /// First version able to answer owner lookups.
    pub const FIND_OWNER_SUPPORT: ProductVersion = ProductVersion::new(12, 2, 1, 4, 0);

    /// First version accepting filtered attribute reads, function execution
    /// and MBean info requests.
    pub const EXTENDED_ACTIONS_SUPPORT: ProductVersion = ProductVersion::new(12, 2, 1, 4, 0);

    /// Version stamped on members created without an explicit version.
    pub const CURRENT: ProductVersion = ProductVersion::new(14, 1, 2, 0, 0);

    pub const fn new(major: u16, minor: u16, micro: u16, patch_set: u16, patch: u16) -> Self {
        Self {
            parts: [major, minor, micro, patch_set, patch],
        }
    }

    pub fn parts(&self) -> [u16; 5] {
        self.parts
    }

    /// True if this version is the same as or newer than `required`.
    pub fn is_at_least(&self, required: &ProductVersion) -> bool {
        self >= required
    }
}

impl Default for ProductVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for ProductVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e] = self.parts;
        write!(f, "{}.{}.{}.{}.{}", a, b, c, d, e)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid product version '{input}': {reason}")]
pub struct VersionParseError {
    pub input: String,
    pub reason: String,
}

impl FromStr for ProductVersion {
    type Err = VersionParseError;

    /// Missing trailing parts default to zero, so `"12.2.1"` parses as
    /// `12.2.1.0.0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = [0u16; 5];
        let pieces: Vec<&str> = s.trim().split('.').collect();
        if pieces.is_empty() || pieces.len() > 5 || pieces.iter().any(|p| p.is_empty()) {
            return Err(VersionParseError {
                input: s.to_string(),
                reason: "expected between one and five dot separated numbers".to_string(),
            });
        }
        for (slot, piece) in parts.iter_mut().zip(pieces) {
            *slot = piece.parse().map_err(|_| VersionParseError {
                input: s.to_string(),
                reason: format!("'{}' is not a number", piece),
            })?;
        }
        Ok(Self { parts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let v: ProductVersion = "12.2.1.4.0".parse().unwrap();
        assert_eq!(v, ProductVersion::new(12, 2, 1, 4, 0));
        assert_eq!(v.to_string(), "12.2.1.4.0");

        let short: ProductVersion = "14.1".parse().unwrap();
        assert_eq!(short, ProductVersion::new(14, 1, 0, 0, 0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<ProductVersion>().is_err());
        assert!("12..1".parse::<ProductVersion>().is_err());
        assert!("1.2.3.4.5.6".parse::<ProductVersion>().is_err());
        assert!("12.x".parse::<ProductVersion>().is_err());
    }

    #[test]
    fn test_feature_gates() {
        let old = ProductVersion::new(12, 2, 1, 0, 0);
        assert!(!old.is_at_least(&ProductVersion::QUERY_SUPPORT));
        assert!(ProductVersion::new(12, 2, 1, 1, 0).is_at_least(&ProductVersion::QUERY_SUPPORT));
        assert!(!ProductVersion::new(12, 2, 1, 3, 9).is_at_least(&ProductVersion::FIND_OWNER_SUPPORT));
        assert!(ProductVersion::CURRENT.is_at_least(&ProductVersion::FIND_OWNER_SUPPORT));
    }
}
