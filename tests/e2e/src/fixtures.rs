//! Beans and listeners shared by the scenarios.

use federation::{ManagementError, NotificationListener, SimpleBean};
use parking_lot::Mutex;
use std::sync::Arc;
use types::{Notification, Value};

/// Bean with a read-only `Count`, a writable `Limit` and an `add`
/// operation summing its long parameters.
pub fn counter_bean(class_name: &str, count: i64) -> Arc<SimpleBean> {
    Arc::new(
        SimpleBean::new(class_name)
            .with_description("Counter used by the end-to-end scenarios")
            .with_attribute("Count", count)
            .with_writable("Limit", 10i64)
            .with_operation("add", |params| {
                params
                    .iter()
                    .map(|p| {
                        p.as_i64().ok_or_else(|| {
                            ManagementError::illegal_argument(format!(
                                "add expects longs, got {}",
                                p.type_name()
                            ))
                        })
                    })
                    .sum::<Result<i64, _>>()
                    .map(Value::Long)
            }),
    )
}

/// Listener keeping every notification it receives.
#[derive(Default)]
pub struct RecordingListener {
    received: Mutex<Vec<(Notification, Option<Value>)>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.received.lock().len()
    }

    pub fn received(&self) -> Vec<(Notification, Option<Value>)> {
        self.received.lock().clone()
    }
}

impl NotificationListener for RecordingListener {
    fn handle_notification(&self, notification: &Notification, handback: Option<&Value>) {
        self.received
            .lock()
            .push((notification.clone(), handback.cloned()));
    }
}
