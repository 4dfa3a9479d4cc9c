//! Data layer wiring
//!
//! [`DataHub`] constructs and owns every moving part of the layer. All
//! state is held by the hub instance - tests build as many isolated hubs
//! as they like, nothing is a process-wide singleton.

use crate::config::DataLayerConfig;
use crate::page::{PageCoordinator, PageKind};
use crate::prefetch::PrefetchPredictor;
use batch_window::BatchScheduler;
use invalidation_bridge::{InvalidationBridge, StatusBus};
use parking_lot::{Mutex, RwLock};
use sightline_cache::{CacheStats, CacheStore};
use sightline_schema::{FetchError, Payload, RemoteSource};
use single_flight::SingleFlight;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct DataHub {
    cache: Arc<CacheStore<Payload>>,
    bus: StatusBus,
    bridge: Arc<InvalidationBridge>,
    pages: Arc<HashMap<PageKind, Arc<PageCoordinator>>>,
    prefetch: Arc<PrefetchPredictor>,
    current_page: Arc<RwLock<Option<PageKind>>>,
    bridge_task: Mutex<Option<JoinHandle<()>>>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl DataHub {
    /// Build the full layer around an injected remote source and start the
    /// background tasks (invalidation bridge consumer, periodic sweep).
    pub fn new(source: Arc<dyn RemoteSource>, config: DataLayerConfig) -> Arc<Self> {
        let cache: Arc<CacheStore<Payload>> =
            Arc::new(CacheStore::with_ceiling(config.sweep_ceiling));
        let flights: Arc<SingleFlight<Payload, FetchError>> = Arc::new(SingleFlight::new());
        let batcher = Arc::new(BatchScheduler::with_window(source, config.batch_window));

        let pages: HashMap<PageKind, Arc<PageCoordinator>> = PageKind::ALL
            .into_iter()
            .map(|page| {
                let coordinator = PageCoordinator::new(
                    page,
                    Arc::clone(&cache),
                    Arc::clone(&flights),
                    Arc::clone(&batcher),
                    config.clone(),
                );
                (page, Arc::new(coordinator))
            })
            .collect();
        let pages = Arc::new(pages);

        let bus = StatusBus::new();
        let bridge = Arc::new(InvalidationBridge::new(Arc::clone(&cache)));
        let current_page: Arc<RwLock<Option<PageKind>>> = Arc::new(RwLock::new(None));

        // A settled crawl refreshes the page the user is looking at, and
        // only when it still shows the settled resource.
        let bridge_task = {
            let pages = Arc::clone(&pages);
            let current_page = Arc::clone(&current_page);
            bridge.start(&bus, move |event| {
                let pages = Arc::clone(&pages);
                let current_page = Arc::clone(&current_page);
                async move {
                    let displayed = {
                        let page = *current_page.read();
                        page.and_then(|page| pages.get(&page).cloned())
                    };
                    if let Some(coordinator) = displayed {
                        if coordinator.resource().as_ref() == Some(&event.resource) {
                            debug!(resource = %event.resource, "crawl settled, refreshing displayed page");
                            coordinator.refresh().await;
                        }
                    }
                    Ok(())
                }
            })
        };

        let sweep_task = {
            let cache = Arc::clone(&cache);
            let interval = config.sweep_interval;
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    let removed = cache.sweep();
                    if removed > 0 {
                        debug!(removed, "periodic cache sweep");
                    }
                }
            })
        };

        info!("data hub started");

        Arc::new(Self {
            cache,
            bus,
            bridge,
            pages,
            prefetch: Arc::new(PrefetchPredictor::new(config.prefetch_min_samples)),
            current_page,
            bridge_task: Mutex::new(Some(bridge_task)),
            sweep_task: Mutex::new(Some(sweep_task)),
        })
    }

    /// Coordinator for one page.
    pub fn page(&self, page: PageKind) -> Arc<PageCoordinator> {
        Arc::clone(&self.pages[&page])
    }

    /// Producer handle for the monitoring subsystem.
    pub fn bus(&self) -> StatusBus {
        self.bus.clone()
    }

    pub fn bridge(&self) -> Arc<InvalidationBridge> {
        Arc::clone(&self.bridge)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Record a navigation, warm the predicted next page in the background,
    /// and hand back the coordinator for the new page.
    pub fn navigate(&self, page: PageKind) -> Arc<PageCoordinator> {
        let previous = self.current_page.write().replace(page);
        if let Some(previous) = previous {
            if previous != page {
                self.prefetch.record(previous, page);
            }
        }

        if let Some(next) = self.prefetch.predict(page) {
            if next != page {
                debug!(%page, predicted = %next, "warming predicted next page");
                let coordinator = Arc::clone(&self.pages[&next]);
                tokio::spawn(async move { coordinator.warm().await });
            }
        }

        Arc::clone(&self.pages[&page])
    }

    /// Stop background tasks and abandon in-flight fetches.
    pub fn shutdown(&self) {
        if let Some(task) = self.bridge_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.sweep_task.lock().take() {
            task.abort();
        }
        for coordinator in self.pages.values() {
            coordinator.deactivate();
        }
        info!("data hub stopped");
    }
}
