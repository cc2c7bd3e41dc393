//! Externally reachable management endpoint.
//!
//! The managing member publishes a service URL and the addresses it listens
//! on. When the URL host is the wildcard address, lookups rewrite it to the
//! listen address that best matches the requester.

use network::{LookupContext, Resolvable};
use parking_lot::RwLock;
use std::net::IpAddr;
use std::sync::Arc;

/// Name the service URL is bound under in the cluster name service.
pub const CONNECTOR_URL_NAME: &str = "management/jmx-connector-url";

pub const WILDCARD_HOST: &str = "0.0.0.0";

const SCHEME: &str = "mgmt";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedEndpoint {
    pub url: Option<String>,
    pub listen_addresses: Vec<IpAddr>,
}

pub fn service_url(host: &str, port: u16) -> String {
    format!("{}://{}:{}/management", SCHEME, host, port)
}

/// Addresses an endpoint bound to `host` accepts connections on.
pub fn listen_addresses(host: &str, local: IpAddr) -> Result<Vec<IpAddr>, String> {
    if host == WILDCARD_HOST {
        return Ok(vec![local]);
    }
    host.parse::<IpAddr>().map(|addr| vec![addr]).map_err(|e| {
        format!(
            "Failed to start the management connector at {}\n\tcaused by: {}",
            host, e
        )
    })
}

/// URL for a requester, with a wildcard host rewritten.
pub fn resolve(endpoint: &PublishedEndpoint, ctx: &LookupContext) -> Option<String> {
    let url = endpoint.url.as_ref()?;
    let wildcard = format!("//{}:", WILDCARD_HOST);
    if !url.contains(&wildcard) {
        return Some(url.clone());
    }
    let requester = ctx.source.or(ctx.accept);
    let host = best_match(&endpoint.listen_addresses, requester)?;
    Some(url.replacen(&wildcard, &format!("//{}:", host), 1))
}

/// Same address, else the longest common prefix, else the first one.
fn best_match(addresses: &[IpAddr], requester: Option<IpAddr>) -> Option<IpAddr> {
    let first = *addresses.first()?;
    let Some(requester) = requester else {
        return Some(first);
    };
    if addresses.contains(&requester) {
        return Some(requester);
    }
    addresses
        .iter()
        .map(|addr| (common_prefix_bits(*addr, requester), *addr))
        .filter(|(bits, _)| *bits > 0)
        .max_by_key(|(bits, _)| *bits)
        .map(|(_, addr)| addr)
        .or(Some(first))
}

fn common_prefix_bits(a: IpAddr, b: IpAddr) -> u32 {
    match (a, b) {
        (IpAddr::V4(a), IpAddr::V4(b)) => (u32::from(a) ^ u32::from(b)).leading_zeros(),
        (IpAddr::V6(a), IpAddr::V6(b)) => (u128::from(a) ^ u128::from(b)).leading_zeros(),
        _ => 0,
    }
}

/// Name service binding that resolves against the current endpoint.
pub(crate) struct EndpointBinding {
    pub(crate) endpoint: Arc<RwLock<PublishedEndpoint>>,
}

impl Resolvable for EndpointBinding {
    fn resolve(&self, ctx: &LookupContext) -> Option<String> {
        resolve(&self.endpoint.read(), ctx)
    }
}
