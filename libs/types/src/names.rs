//! Canonical MBean name handling.
//!
//! A canonical name is a comma delimited list of `key=value` pairs, for
//! example `type=Cache,service=dist,name=orders,nodeId=4`. Names that carry a
//! `nodeId` or `responsibility` key are *global*: they are federated to every
//! managing member. All other names stay on the member that registered them.
//!
//! Pattern matching treats a name as the set of its key pairs. A pattern
//! matches when its key set is a subset of the name's key set, so key order
//! must be deterministic for names produced by [`globalize`].

use crate::member::{Member, MemberId};
use std::collections::BTreeSet;

pub const KEY_NODE_ID: &str = "nodeId=";
pub const KEY_RESPONSIBILITY: &str = "responsibility=";
pub const KEY_CLUSTER: &str = "cluster=";
pub const KEY_MEMBER: &str = "member=";
pub const KEY_TYPE: &str = "type=";

pub const CLUSTER_TYPE: &str = "type=Cluster";
pub const NODE_TYPE: &str = "type=Node";
pub const SERVICE_TYPE: &str = "type=Service";
pub const CACHE_TYPE: &str = "type=Cache";
pub const CONNECTION_MANAGER_TYPE: &str = "type=ConnectionManager";
pub const CONNECTION_TYPE: &str = "type=Connection";
pub const STORAGE_MANAGER_TYPE: &str = "type=StorageManager";
pub const POINT_TO_POINT_TYPE: &str = "type=PointToPoint";
pub const REPORTER_TYPE: &str = "type=Reporter";
pub const MANAGEMENT_TYPE: &str = "type=Management";
pub const HEALTH_TYPE: &str = "type=HealthCheck";

/// Suffix marking a name as a pattern covering every name that extends it
pub const WILDCARD_SUFFIX: &str = ",*";

/// Naming options that influence [`globalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamingContext {
    /// Append `cluster=` and `member=` keys
    pub extended: bool,
    pub cluster_name: String,
}

/// Iterate the non-empty `key=value` parts of a name.
pub fn parts(name: &str) -> impl Iterator<Item = &str> {
    name.split(',').map(str::trim).filter(|p| !p.is_empty())
}

pub fn key_set(name: &str) -> BTreeSet<&str> {
    parts(name).collect()
}

/// True if any part of the name starts with `key` (including the `=`).
pub fn has_key(name: &str, key: &str) -> bool {
    parts(name).any(|p| p.starts_with(key))
}

/// Value of the first part starting with `key`.
pub fn value_of<'a>(name: &'a str, key: &str) -> Option<&'a str> {
    parts(name).find_map(|p| p.strip_prefix(key))
}

pub fn is_responsibility(name: &str) -> bool {
    name.contains(KEY_RESPONSIBILITY)
}

/// Global names must be visible on every managing member.
pub fn is_global(name: &str) -> bool {
    name.contains(KEY_NODE_ID) || is_responsibility(name)
}

/// Cluster-wide beans that never receive member qualifiers.
pub fn is_non_member(name: &str) -> bool {
    if is_responsibility(name) {
        return true;
    }
    matches!(
        parts(name).next(),
        Some(CLUSTER_TYPE) | Some(MANAGEMENT_TYPE)
    )
}

/// Member id embedded in a `nodeId=` key, if present and numeric.
pub fn extract_member_id(name: &str) -> Option<MemberId> {
    value_of(name, KEY_NODE_ID).and_then(|v| v.parse().ok())
}

/// Split a trailing wildcard from a name.
///
/// A lone `*` yields an empty base name.
pub fn split_wildcard(name: &str) -> (&str, bool) {
    if name == "*" {
        ("", true)
    } else if let Some(base) = name.strip_suffix(WILDCARD_SUFFIX) {
        (base, true)
    } else {
        (name, false)
    }
}

/// Drop a leading `Domain:` qualifier.
pub fn strip_domain(name: &str) -> &str {
    match name.split_once(':') {
        Some((_, rest)) => rest,
        None => name,
    }
}

/// True if every key pair of `pattern` is also a key pair of `name`.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name_parts = key_set(name);
    parts(pattern).all(|p| name_parts.contains(p))
}

/// Qualify a short name with the member (and optionally cluster) keys.
///
/// Keys are appended in a fixed order: `cluster`, `member`, `nodeId`. Non
/// member beans only get the cluster key. A trailing wildcard is preserved.
/// Names that are already qualified come back unchanged.
pub fn globalize(name: &str, member: &Member, naming: &NamingContext) -> String {
    let (base, wildcard) = split_wildcard(name);
    let non_member = is_non_member(base);

    let qualified = if non_member {
        !naming.extended || has_key(base, KEY_CLUSTER)
    } else {
        has_key(base, KEY_NODE_ID)
    };
    if qualified {
        return name.to_string();
    }

    let mut out: Vec<String> = Vec::with_capacity(5);
    if !base.is_empty() {
        out.push(base.to_string());
    }
    if naming.extended {
        out.push(format!("{}{}", KEY_CLUSTER, naming.cluster_name));
    }
    if !non_member {
        if naming.extended && !member.member_name().is_empty() {
            out.push(format!("{}{}", KEY_MEMBER, member.member_name()));
        }
        out.push(format!("{}{}", KEY_NODE_ID, member.id));
    }
    if wildcard {
        out.push("*".to_string());
    }
    out.join(",")
}
