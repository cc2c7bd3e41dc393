use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Refresh and notification counters of a connector.
#[derive(Debug, Default)]
pub struct ConnectorStats {
    refresh: AtomicU64,
    refresh_excess: AtomicU64,
    refresh_prediction: AtomicU64,
    refresh_timeout: AtomicU64,
    notification: AtomicU64,
}

/// Point-in-time copy of [`ConnectorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub refresh_count: u64,
    /// Refreshes of models nobody read since the previous one
    pub refresh_excess_count: u64,
    /// Refreshes issued ahead of a read
    pub refresh_prediction_count: u64,
    pub refresh_timeout_count: u64,
    pub notification_count: u64,
}

impl ConnectorStats {
    pub fn record_refresh(&self) {
        self.refresh.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refreshes(&self, count: u64) {
        self.refresh.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_excess(&self) {
        self.refresh_excess.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_prediction(&self) {
        self.record_predictions(1);
    }

    pub fn record_predictions(&self, count: u64) {
        self.refresh_prediction.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.refresh_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification(&self) {
        self.notification.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            refresh_count: self.refresh.load(Ordering::Relaxed),
            refresh_excess_count: self.refresh_excess.load(Ordering::Relaxed),
            refresh_prediction_count: self.refresh_prediction.load(Ordering::Relaxed),
            refresh_timeout_count: self.refresh_timeout.load(Ordering::Relaxed),
            notification_count: self.notification.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.refresh,
            &self.refresh_excess,
            &self.refresh_prediction,
            &self.refresh_timeout,
            &self.notification,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
