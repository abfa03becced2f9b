use hive_archive::{ArchiveView, Completion, Notifier, ProgressSink};
use hive_events::Bus;
use hive_topics::{
    TOPIC_ARCHIVES_ERROR, TOPIC_ARCHIVES_UPDATED, TOPIC_DOWNLOAD_COMPLETED, TOPIC_PROGRESS,
};
use serde_json::json;

use crate::ManagerError;

/// Receives the full archive list after every state change, plus any error
/// escalated outside of a caller's request.
pub trait UpdateObserver: Send + Sync {
    fn on_update(&self, error: Option<&ManagerError>, archives: &[ArchiveView]);
}

impl<F> UpdateObserver for F
where
    F: Fn(Option<&ManagerError>, &[ArchiveView]) + Send + Sync,
{
    fn on_update(&self, error: Option<&ManagerError>, archives: &[ArchiveView]) {
        self(error, archives)
    }
}

/// Publishes observer snapshots on the event bus.
#[derive(Clone)]
pub struct BusObserver {
    bus: Bus,
}

impl BusObserver {
    pub fn new(bus: Bus) -> Self {
        Self { bus }
    }
}

impl UpdateObserver for BusObserver {
    fn on_update(&self, error: Option<&ManagerError>, archives: &[ArchiveView]) {
        if let Some(err) = error {
            self.bus.publish(TOPIC_ARCHIVES_ERROR, &err.report());
        }
        self.bus
            .publish(TOPIC_ARCHIVES_UPDATED, &json!({ "archives": archives }));
    }
}

/// Publishes "download finished" notifications on the event bus.
#[derive(Clone)]
pub struct BusNotifier {
    bus: Bus,
}

impl BusNotifier {
    pub fn new(bus: Bus) -> Self {
        Self { bus }
    }
}

impl Notifier for BusNotifier {
    fn completed(&self, completion: &Completion) {
        self.bus.publish(TOPIC_DOWNLOAD_COMPLETED, completion);
    }
}

/// Publishes the swarm-wide progress value on the event bus.
#[derive(Clone)]
pub struct BusProgressSink {
    bus: Bus,
}

impl BusProgressSink {
    pub fn new(bus: Bus) -> Self {
        Self { bus }
    }
}

impl ProgressSink for BusProgressSink {
    fn publish(&self, value: f64) {
        self.bus.publish(TOPIC_PROGRESS, &json!({ "value": value }));
    }
}
