//! Crawl status events
//!
//! Produced by the monitoring subsystem, consumed by the invalidation
//! bridge. Never mutated after creation. Delivery is at-least-once with
//! per-resource ordering only.

use crate::ResourceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a website crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrawlStatus {
    Queued,
    Crawling,
    Completed,
    Failed,
}

impl CrawlStatus {
    /// Terminal statuses mean the resource's data has settled and displayed
    /// views should be refreshed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlStatus::Completed | CrawlStatus::Failed)
    }
}

impl std::fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrawlStatus::Queued => write!(f, "queued"),
            CrawlStatus::Crawling => write!(f, "crawling"),
            CrawlStatus::Completed => write!(f, "completed"),
            CrawlStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One out-of-band status change notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub event_id: Uuid,
    pub resource: ResourceId,
    pub status: CrawlStatus,
    pub occurred_at: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(resource: ResourceId, status: CrawlStatus) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            resource,
            status,
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(CrawlStatus::Completed.is_terminal());
        assert!(CrawlStatus::Failed.is_terminal());
        assert!(!CrawlStatus::Queued.is_terminal());
        assert!(!CrawlStatus::Crawling.is_terminal());
    }

    #[test]
    fn test_event_serde_roundtrip() {
        let event = StatusEvent::new(ResourceId::new("site-1"), CrawlStatus::Completed);

        let json = serde_json::to_string(&event).unwrap();
        let back: StatusEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(event.event_id, back.event_id);
        assert_eq!(event.resource, back.resource);
        assert_eq!(event.status, back.status);
    }
}
