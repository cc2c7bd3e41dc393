//! Gateway
//!
//! Registry of the beans that live on this member. It decides the canonical
//! name of every bean, wraps each bean in a [`LocalModel`], keeps the health
//! checks of the member, and hands global models to the [`Connector`] so
//! they become visible on managing members.
//!
//! Registration never contacts other members directly.

use crate::bean::{HealthCheck, ManagedObject};
use crate::connector::Connector;
use crate::error::{ManagementError, Result};
use crate::health::{self, HealthCheckBean, HealthAspect};
use crate::mbean_server::MBeanView;
use crate::model::{LocalModel, Model, ModelRef};
use config::GatewayConfig;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use types::{names, Filter, Member, ModelKind, NamingContext, Notification};

/// What a custom bean factory produces.
#[derive(Clone)]
pub enum CustomBean {
    Single(ManagedObject),
    /// One entry per child, registered as `<name>,Name=<child>`
    Collection(Vec<(String, ManagedObject)>),
}

pub type BeanFactory = Arc<dyn Fn() -> Result<CustomBean> + Send + Sync>;

pub struct Gateway {
    config: GatewayConfig,
    naming: NamingContext,
    local_member: RwLock<Member>,
    primary: AtomicBool,
    local_models: DashMap<String, Arc<LocalModel>>,
    /// Instances kept across resets
    custom_beans: DashMap<String, CustomBean>,
    factories: DashMap<String, BeanFactory>,
    health_checks: DashMap<String, Arc<dyn HealthCheck>>,
    connector: Arc<Connector>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, local_member: Member, connector: Arc<Connector>) -> Arc<Self> {
        let naming = NamingContext {
            extended: config.extended_mbean_name,
            cluster_name: config.cluster_name.clone(),
        };
        let gateway = Arc::new(Self {
            config,
            naming,
            local_member: RwLock::new(local_member),
            primary: AtomicBool::new(false),
            local_models: DashMap::new(),
            custom_beans: DashMap::new(),
            factories: DashMap::new(),
            health_checks: DashMap::new(),
            connector,
        });
        gateway.connector.attach_gateway(&gateway);
        gateway
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn connector(&self) -> &Arc<Connector> {
        &self.connector
    }

    pub fn local_member(&self) -> Member {
        self.local_member.read().clone()
    }

    pub fn set_local_member(&self, member: Member) {
        *self.local_member.write() = member;
    }

    /// Bind this gateway as the member's management registry. Only once.
    pub fn make_primary(&self) -> Result<()> {
        if self.primary.swap(true, Ordering::SeqCst) {
            return Err(ManagementError::illegal_state("Gateway is already primary"));
        }
        debug!(domain = %self.config.domain_name, "Gateway is primary");
        Ok(())
    }

    pub fn is_primary(&self) -> bool {
        self.primary.load(Ordering::SeqCst)
    }

    /// Canonical name of a bean of this member. Idempotent.
    pub fn ensure_global_name(&self, name: &str) -> String {
        let name = names::strip_domain(name);
        names::globalize(name, &self.local_member.read(), &self.naming)
    }

    /// Register a bean under a canonical name.
    ///
    /// Names rejected by the exclude filter are skipped. Only a malformed
    /// name is reported; anything else is logged and dropped. A gateway
    /// that is not primary passes registrations through untouched.
    pub fn register(&self, name: &str, object: ManagedObject) -> Result<()> {
        validate_name(name)?;
        if !self.is_primary() {
            trace!(name, "Gateway is not primary, registration ignored");
            return Ok(());
        }
        if !self.config.admits(name) {
            trace!(name, "MBean excluded by filter");
            return Ok(());
        }

        let kind = object.kind();
        let health = match &object {
            ManagedObject::HealthCheck(check) => Some(check.clone()),
            _ => None,
        };
        let model = Arc::new(LocalModel::new(name, object, self.config.read_only));
        if let Some(check) = health.or_else(|| model.health_check()) {
            self.health_checks.insert(check.name(), check.clone());
            if kind != ModelKind::HealthCheck {
                self.register_health_entry(&model, check, kind);
            }
        }
        self.register_model(model);
        Ok(())
    }

    /// Parallel health entry for a model whose bean also reports health.
    fn register_health_entry(&self, model: &LocalModel, check: Arc<dyn HealthCheck>, kind: ModelKind) {
        let bean = HealthCheckBean::new(check, health::sub_type_for(kind));
        let name = self.ensure_global_name(&bean.mbean_name());
        let entry = Arc::new(LocalModel::from_parts(
            name.clone(),
            ModelKind::HealthCheck,
            Arc::new(bean),
            true,
        ));
        model.set_health_model_name(Some(name));
        self.register_model(entry);
    }

    fn register_model(&self, model: Arc<LocalModel>) {
        if !self.is_primary() {
            return;
        }
        let name = model.name().to_string();
        if let Some(previous) = self.local_models.insert(name.clone(), model.clone()) {
            if previous.kind() != model.kind() {
                warn!(name = %name, previous = %previous.kind(), current = %model.kind(), "MBean replaced by a different type");
            }
        }
        trace!(name = %name, kind = %model.kind(), "Registered local MBean");

        if let Some(view) = self.connector.view() {
            if self.connector.config().managed_nodes.shows_local_beans() {
                view.register(ModelRef::Local(model.clone()));
            }
        }
        if names::is_global(&name) {
            self.connector.register_model(model);
        }
    }

    /// Unregister a name or a `,*` pattern; returns every removed name,
    /// health entries included.
    pub fn unregister(&self, name: &str) -> Vec<String> {
        if !self.is_primary() {
            trace!(name, "Gateway is not primary, unregistration ignored");
            return Vec::new();
        }
        let (base, wildcard) = names::split_wildcard(name);
        let mut taken: Vec<(String, Arc<LocalModel>)> = if wildcard {
            remove_by_pattern(&self.local_models, base).into_iter().collect()
        } else {
            self.local_models.remove(name).into_iter().collect()
        };

        let mut removed = Vec::with_capacity(taken.len());
        while let Some((next, model)) = taken.pop() {
            if let Some(health_name) = model.health_model_name() {
                if let Some(entry) = self.local_models.remove(&health_name) {
                    taken.push(entry);
                }
            }
            self.forget(&next, &model);
            removed.push(next);
        }
        removed.sort();
        removed
    }

    fn forget(&self, name: &str, model: &Arc<LocalModel>) {
        if model.kind() == ModelKind::HealthCheck {
            let check_name = names::value_of(name, "name=").unwrap_or_default();
            self.health_checks.remove(check_name);
        } else if let Some(check) = model.health_check() {
            self.health_checks.remove(&check.name());
        }
        model.clear_remote_listeners();
        if let Some(view) = self.connector.view() {
            view.unregister(name, Some(&ModelRef::Local(model.clone())));
        }
        if names::is_global(name) {
            self.connector.unregister_model(name);
        }
    }

    pub fn local_model(&self, name: &str) -> Option<Arc<LocalModel>> {
        self.local_models.get(name).map(|entry| entry.value().clone())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.local_models.contains_key(name)
    }

    pub fn local_names(&self) -> BTreeSet<String> {
        self.local_models.iter().map(|e| e.key().clone()).collect()
    }

    /// Local names matching a pattern (`*`, `key=value,*`, or exact).
    pub fn query_local_names(&self, pattern: &str, filter: Option<&Filter>) -> BTreeSet<String> {
        let (base, wildcard) = names::split_wildcard(pattern);
        self.local_models
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|name| {
                if pattern.is_empty() || wildcard {
                    names::matches_pattern(name, base)
                } else {
                    name == pattern
                }
            })
            .filter(|name| filter.map_or(true, |f| f.evaluate(name)))
            .collect()
    }

    /// Anyone listening to this name, here or on another member.
    pub fn is_subscribed_to(&self, name: &str) -> bool {
        if let Some(model) = self.local_model(name) {
            return model.is_subscribed_to();
        }
        self.connector
            .view()
            .and_then(|view| view.model(name))
            .map_or(false, |model| model.is_subscribed_to())
    }

    /// Emit a notification from a local bean.
    pub fn trigger(&self, name: &str, kind: &str, message: &str) -> Result<Notification> {
        let model = self
            .local_model(name)
            .ok_or_else(|| ManagementError::instance_not_found(name))?;
        Ok(model.emit(kind, message))
    }

    /// Drop every global name; local-only names stay.
    pub fn reset(&self) {
        if !self.is_primary() {
            return;
        }
        let global: Vec<String> = self
            .local_models
            .iter()
            .filter(|entry| names::is_global(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        let mut count = 0;
        for name in global {
            if let Some((_, model)) = self.local_models.remove(&name) {
                self.forget(&name, &model);
                count += 1;
            }
        }
        debug!(count, "Gateway reset dropped global MBeans");
    }

    /// Build the managing view: local beans plus the cached remote ones.
    pub(crate) fn transition_to_managing(&self) -> Arc<MBeanView> {
        if let Some(view) = self.connector.view() {
            return view;
        }
        let view = Arc::new(MBeanView::new());
        if self.connector.config().managed_nodes.shows_local_beans() {
            for entry in self.local_models.iter() {
                view.register(ModelRef::Local(entry.value().clone()));
            }
        }
        for name in self.connector.remote_model_names() {
            if let Some(model) = self.connector.remote_model(&name) {
                view.register(ModelRef::Remote(model));
            }
        }
        info!(models = view.len(), "Gateway is managing");
        self.connector.set_view(Some(view.clone()));
        view
    }

    pub fn register_health_check(&self, check: Arc<dyn HealthCheck>) -> Result<String> {
        let name = self.ensure_global_name(&health::health_mbean_name(
            health::SUBTYPE_APPLICATION,
            &check.name(),
        ));
        self.register(&name, ManagedObject::HealthCheck(check))?;
        Ok(name)
    }

    pub fn unregister_health_check(&self, check_name: &str) -> Vec<String> {
        let name = self.ensure_global_name(&health::health_mbean_name(
            health::SUBTYPE_APPLICATION,
            check_name,
        ));
        self.unregister(&name)
    }

    pub fn health_checks(&self) -> Vec<Arc<dyn HealthCheck>> {
        self.health_checks.iter().map(|e| e.value().clone()).collect()
    }

    pub fn all_health_checks_live(&self) -> bool {
        health::aggregate(&self.health_checks, HealthAspect::Live)
    }

    pub fn all_health_checks_ready(&self) -> bool {
        health::aggregate(&self.health_checks, HealthAspect::Ready)
    }

    pub fn all_health_checks_safe(&self) -> bool {
        health::aggregate(&self.health_checks, HealthAspect::Safe)
    }

    pub fn all_health_checks_started(&self) -> bool {
        health::aggregate(&self.health_checks, HealthAspect::Started)
    }

    pub fn register_factory(&self, key: impl Into<String>, factory: BeanFactory) {
        self.factories.insert(key.into(), factory);
    }

    /// Register the configured custom beans. Failures are logged and the
    /// bean is skipped. Returns the registered names.
    pub fn register_custom_beans(&self) -> Vec<String> {
        let mut registered = Vec::new();
        for cfg in self.config.custom_mbeans.iter().filter(|cfg| cfg.enabled) {
            let bean = if cfg.extend_lifecycle {
                match self.custom_beans.get(&cfg.name).map(|e| e.value().clone()) {
                    Some(existing) => Some(existing),
                    None => self.create_custom_bean(&cfg.name, &cfg.factory).map(|bean| {
                        self.custom_beans.insert(cfg.name.clone(), bean.clone());
                        bean
                    }),
                }
            } else {
                self.create_custom_bean(&cfg.name, &cfg.factory)
            };
            let Some(bean) = bean else {
                continue;
            };

            let entries = match bean {
                CustomBean::Single(object) => vec![(cfg.name.clone(), object)],
                CustomBean::Collection(children) => children
                    .into_iter()
                    .map(|(child, object)| (format!("{},Name={}", cfg.name, child), object))
                    .collect(),
            };
            for (short, object) in entries {
                let name = if cfg.local_only {
                    names::strip_domain(&short).to_string()
                } else {
                    self.ensure_global_name(&short)
                };
                match self.register(&name, object) {
                    Ok(()) => registered.push(name),
                    Err(e) => warn!(name = %name, error = %e, "Custom MBean not registered"),
                }
            }
        }
        registered
    }

    fn create_custom_bean(&self, name: &str, factory: &str) -> Option<CustomBean> {
        let Some(factory_fn) = self.factories.get(factory).map(|e| e.value().clone()) else {
            warn!(name, factory, "Unknown custom MBean factory");
            return None;
        };
        match factory_fn() {
            Ok(bean) => Some(bean),
            Err(e) => {
                warn!(name, factory, error = %e, "Custom MBean factory failed");
                None
            }
        }
    }
}

/// Reject names that are not a list of `key=value` pairs.
pub fn validate_name(name: &str) -> Result<()> {
    let (base, _) = names::split_wildcard(names::strip_domain(name));
    let valid = !base.is_empty()
        && base.split(',').all(|part| {
            let part = part.trim();
            matches!(part.split_once('='), Some((key, value)) if !key.is_empty() && !value.is_empty())
        });
    if valid {
        Ok(())
    } else {
        Err(ManagementError::illegal_argument(format!(
            "Invalid MBean name: {}",
            name
        )))
    }
}

/// Remove every entry whose key set contains the pattern's key set and
/// return the removed entries.
pub fn remove_by_pattern<V>(registry: &DashMap<String, V>, pattern: &str) -> BTreeMap<String, V> {
    let matching: Vec<String> = registry
        .iter()
        .filter(|entry| names::matches_pattern(entry.key(), pattern))
        .map(|entry| entry.key().clone())
        .collect();
    matching
        .into_iter()
        .filter_map(|key| registry.remove(&key))
        .collect()
}
