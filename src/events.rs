//! Fan-out of controller and configuration changes to every connected display.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::models::config::DashboardConfig;
use crate::models::status::ControllerStatus;

pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Wire envelope: `{"type": "status" | "config", "data": ...}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum DashboardEvent {
    Status(ControllerStatus),
    Config(DashboardConfig),
}

/// Publish/subscribe channel. Every subscriber sees every event published
/// after it subscribed; publishing with no subscribers is not an error.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<DashboardEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish_status(&self, status: ControllerStatus) {
        trace!(state_id = status.state_id, "publishing status");
        self.publish(DashboardEvent::Status(status));
    }

    pub fn publish_config(&self, config: DashboardConfig) {
        self.publish(DashboardEvent::Config(config));
    }

    fn publish(&self, event: DashboardEvent) {
        if let Err(e) = self.tx.send(event) {
            trace!("no event subscribers: {}", e);
        }
    }
}
