//! Cluster-wide name service.

use crate::error::{Result, TransportError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Addresses of the member performing a lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupContext {
    pub source: Option<IpAddr>,
    pub accept: Option<IpAddr>,
}

/// A bound object resolved lazily for each requester.
pub trait Resolvable: Send + Sync {
    fn resolve(&self, ctx: &LookupContext) -> Option<String>;
}

impl Resolvable for String {
    fn resolve(&self, _ctx: &LookupContext) -> Option<String> {
        Some(self.clone())
    }
}

#[derive(Default)]
pub struct NameService {
    bindings: RwLock<HashMap<String, Arc<dyn Resolvable>>>,
}

impl std::fmt::Debug for NameService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameService")
            .field("bindings", &self.bindings.read().keys().cloned().collect::<Vec<_>>())
            .finish()
    }
}

impl NameService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails if the name is already bound.
    pub fn bind(&self, name: &str, object: Arc<dyn Resolvable>) -> Result<()> {
        let mut bindings = self.bindings.write();
        if bindings.contains_key(name) {
            return Err(TransportError::name_service(name, "already bound"));
        }
        debug!(name, "Binding name");
        bindings.insert(name.to_string(), object);
        Ok(())
    }

    pub fn rebind(&self, name: &str, object: Arc<dyn Resolvable>) {
        self.bindings.write().insert(name.to_string(), object);
    }

    pub fn unbind(&self, name: &str) -> bool {
        self.bindings.write().remove(name).is_some()
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.read().contains_key(name)
    }

    pub fn lookup(&self, name: &str, ctx: &LookupContext) -> Option<String> {
        let object = self.bindings.read().get(name).cloned()?;
        object.resolve(ctx)
    }
}
