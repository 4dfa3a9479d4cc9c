//! In-process status event bus

use sightline_schema::StatusEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Default channel depth. Status changes are rare per resource; a lagged
/// receiver only misses notifications, never correctness.
pub const DEFAULT_CAPACITY: usize = 256;

/// Broadcast channel carrying crawl status events.
///
/// Cloned into the monitoring subsystem (producer side) and handed to the
/// bridge (consumer side) by the orchestrator.
#[derive(Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Returns the number of live subscribers it reached;
    /// zero subscribers is not an error.
    pub fn publish(&self, event: StatusEvent) -> usize {
        debug!(
            event_id = %event.event_id,
            resource = %event.resource,
            status = %event.status,
            "publishing status event"
        );
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}
