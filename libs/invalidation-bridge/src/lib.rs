//! Status event bus and cache invalidation bridge
//!
//! The monitoring subsystem publishes [`StatusEvent`]s to a [`StatusBus`];
//! the [`InvalidationBridge`] consumes them and keeps the cache coherent:
//!
//! 1. Replayed events (same `event_id`) are dropped - delivery is
//!    at-least-once and the bridge must be idempotent.
//! 2. Consecutive identical statuses for a resource are suppressed; they
//!    carry no new information and must not re-trigger invalidation or a
//!    user-visible notification.
//! 3. A real status change demotes every cache entry tagged with the
//!    resource, and terminal statuses additionally run the registered
//!    refresh hook so the currently displayed view can reload in the
//!    background.
//!
//! Both the producer and the bridge receive the bus by injection; nothing
//! here is a process-wide ambient global.
//!
//! # Example
//!
//! ```no_run
//! use invalidation_bridge::{InvalidationBridge, StatusBus};
//! use sightline_cache::CacheStore;
//! use sightline_schema::{CrawlStatus, Payload, ResourceId, StatusEvent};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cache: Arc<CacheStore<Payload>> = Arc::new(CacheStore::new());
//! let bus = StatusBus::new();
//! let bridge = Arc::new(InvalidationBridge::new(Arc::clone(&cache)));
//!
//! let handle = bridge.start(&bus, |event| async move {
//!     println!("crawl settled for {}", event.resource);
//!     Ok(())
//! });
//!
//! bus.publish(StatusEvent::new(
//!     ResourceId::new("site-1"),
//!     CrawlStatus::Completed,
//! ));
//! # handle.abort();
//! # }
//! ```

mod bus;

pub use bus::StatusBus;

use dashmap::DashMap;
use parking_lot::Mutex;
use sightline_cache::{CacheStore, Matcher};
use sightline_schema::{resource_tag, CrawlStatus, Payload, ResourceId, StatusEvent};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How many recently processed event ids the bridge remembers for replay
/// suppression.
const EVENT_MEMORY: usize = 256;

/// What the bridge did with one delivered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// New information: matching cache entries were demoted.
    Applied { invalidated: usize },
    /// Replay of an already processed event id; dropped.
    DuplicateEvent,
    /// Same status as the last one observed for this resource; suppressed.
    DuplicateStatus,
}

struct RecentEvents {
    order: VecDeque<Uuid>,
    seen: HashSet<Uuid>,
}

impl RecentEvents {
    fn new() -> Self {
        Self {
            order: VecDeque::with_capacity(EVENT_MEMORY),
            seen: HashSet::with_capacity(EVENT_MEMORY),
        }
    }

    /// Record `id`, returning false if it was already present.
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > EVENT_MEMORY {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

/// Subscribes to crawl status events and invalidates dependent cache
/// entries.
pub struct InvalidationBridge {
    cache: Arc<CacheStore<Payload>>,
    last_status: DashMap<ResourceId, CrawlStatus>,
    recent: Mutex<RecentEvents>,
    applied: AtomicU64,
    suppressed: AtomicU64,
}

impl InvalidationBridge {
    pub fn new(cache: Arc<CacheStore<Payload>>) -> Self {
        Self {
            cache,
            last_status: DashMap::new(),
            recent: Mutex::new(RecentEvents::new()),
            applied: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Apply one event to the cache. Pure bookkeeping plus invalidation;
    /// the refresh hook is the consumer loop's concern.
    pub fn process(&self, event: &StatusEvent) -> BridgeOutcome {
        if !self.recent.lock().insert(event.event_id) {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            debug!(event_id = %event.event_id, "duplicate event delivery dropped");
            return BridgeOutcome::DuplicateEvent;
        }

        let unchanged = self
            .last_status
            .get(&event.resource)
            .map(|last| *last == event.status)
            .unwrap_or(false);
        if unchanged {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            debug!(
                resource = %event.resource,
                status = %event.status,
                "consecutive duplicate status suppressed"
            );
            return BridgeOutcome::DuplicateStatus;
        }

        self.last_status
            .insert(event.resource.clone(), event.status);

        let invalidated = self
            .cache
            .invalidate(&Matcher::Tag(resource_tag(&event.resource)));
        self.applied.fetch_add(1, Ordering::Relaxed);

        info!(
            resource = %event.resource,
            status = %event.status,
            invalidated,
            "status change applied"
        );
        BridgeOutcome::Applied { invalidated }
    }

    /// Spawn the consumer loop. `on_settled` runs for every applied event
    /// with a terminal status; the hook decides whether the resource is
    /// currently displayed and worth refreshing.
    pub fn start<F, Fut>(self: &Arc<Self>, bus: &StatusBus, on_settled: F) -> JoinHandle<()>
    where
        F: Fn(StatusEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let bridge = Arc::clone(self);
        let mut receiver = bus.subscribe();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let outcome = bridge.process(&event);
                        let settled = matches!(outcome, BridgeOutcome::Applied { .. })
                            && event.status.is_terminal();
                        if settled {
                            if let Err(e) = on_settled(event.clone()).await {
                                error!(
                                    error = ?e,
                                    resource = %event.resource,
                                    "refresh hook failed"
                                );
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Missed events are only missed notifications; the
                        // next status change still invalidates correctly.
                        warn!(skipped, "status bus receiver lagged");
                    }
                    Err(RecvError::Closed) => {
                        warn!("status bus closed, bridge stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Last status the bridge observed for a resource.
    pub fn last_status(&self, resource: &ResourceId) -> Option<CrawlStatus> {
        self.last_status.get(resource).map(|s| *s)
    }

    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }
}
