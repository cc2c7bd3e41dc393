//! Predictive refreshes and reporting over the remote model cache.

use super::Connector;
use crate::model::{Model, RemoteModel};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::trace;
use types::{MemberId, ModelKind};

/// One cached remote model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteModelReport {
    pub name: String,
    pub owner: MemberId,
    pub kind: ModelKind,
    pub accessed: bool,
}

/// A local model other members listen to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionReport {
    pub name: String,
    pub subscribers: Vec<MemberId>,
}

impl Connector {
    fn cached_models(&self) -> Vec<Arc<RemoteModel>> {
        self.remote_models
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Refresh in the background every expired model that has been read.
    pub fn refresh_active_models(&self) {
        let ttl = self.config.refresh_timeout();
        let issued = self
            .cached_models()
            .into_iter()
            .filter(|model| model.is_refresh_required(ttl) && model.is_accessed())
            .filter(|model| model.invoke_remote_async())
            .count() as u64;
        if issued > 0 {
            trace!(issued, "Refreshed active models ahead");
        }
        self.stats.record_predictions(issued);
    }

    /// Refresh the models a name query matched.
    pub fn refresh_remote_models(&self, names: &BTreeSet<String>) {
        let mut issued = 0;
        for name in names {
            let Some(model) = self.remote_model(name) else {
                continue;
            };
            if !model.is_accessed() {
                self.stats.record_excess();
            }
            if model.invoke_remote_async() {
                issued += 1;
            }
        }
        self.stats.record_predictions(issued);
        self.stats.record_refreshes(issued);
    }

    pub fn report_remote_models(&self) -> Vec<RemoteModelReport> {
        let mut report: Vec<RemoteModelReport> = self
            .cached_models()
            .into_iter()
            .map(|model| RemoteModelReport {
                name: model.name().to_string(),
                owner: model.owner().id,
                kind: model.kind(),
                accessed: model.is_accessed(),
            })
            .collect();
        report.sort_by(|a, b| a.name.cmp(&b.name));
        report
    }

    pub fn report_subscriptions(&self) -> Vec<SubscriptionReport> {
        let mut report: Vec<SubscriptionReport> = self
            .local_registry
            .iter()
            .filter_map(|entry| {
                let mut subscribers: Vec<MemberId> = entry
                    .value()
                    .remote_subscribers()
                    .into_iter()
                    .map(|holder| holder.member_id)
                    .collect();
                if subscribers.is_empty() {
                    return None;
                }
                subscribers.sort_unstable();
                subscribers.dedup();
                Some(SubscriptionReport {
                    name: entry.key().clone(),
                    subscribers,
                })
            })
            .collect();
        report.sort_by(|a, b| a.name.cmp(&b.name));
        report
    }
}
