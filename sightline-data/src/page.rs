//! Per-page load coordination
//!
//! Each page owns a [`PageCoordinator`] that runs the load strategy for its
//! current `(resource, filters)` tuple:
//!
//! 1. Fresh filtered cache entry -> adopted synchronously, network skipped.
//!    There is no await point on this path, which is what keeps a loading
//!    skeleton from flashing over data we already have.
//! 2. Fresh unfiltered base entry -> adopted as interim display while the
//!    filtered fetch proceeds in the background.
//! 3. Otherwise a deduplicated, batched, retried fetch runs; its result is
//!    written back to the cache and applied to the view state only if the
//!    page still shows the same resource (generation check) and filters.
//!
//! Failures never clear displayed data. Cancellations are swallowed.

use crate::config::DataLayerConfig;
use crate::retry::with_retry;
use batch_window::BatchScheduler;
use parking_lot::{Mutex, RwLock};
use sightline_cache::CacheStore;
use sightline_schema::{
    resource_tag, CancelToken, DataKind, FetchError, FilterSet, Payload, RequestSignature,
    ResourceId, ResourceQuery,
};
use single_flight::SingleFlight;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// The pages of the dashboard application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Dashboard,
    Analysis,
    Competitors,
    Websites,
}

impl PageKind {
    /// The data domain this page displays.
    pub fn data_kind(&self) -> DataKind {
        match self {
            PageKind::Dashboard => DataKind::Visibility,
            PageKind::Analysis => DataKind::Topics,
            PageKind::Competitors => DataKind::Competitors,
            PageKind::Websites => DataKind::Websites,
        }
    }

    pub const ALL: [PageKind; 4] = [
        PageKind::Dashboard,
        PageKind::Analysis,
        PageKind::Competitors,
        PageKind::Websites,
    ];
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageKind::Dashboard => write!(f, "dashboard"),
            PageKind::Analysis => write!(f, "analysis"),
            PageKind::Competitors => write!(f, "competitors"),
            PageKind::Websites => write!(f, "websites"),
        }
    }
}

/// What a view needs to render one page.
#[derive(Debug, Clone)]
pub struct PageViewState {
    pub data: Option<Payload>,
    /// A load is running with nothing usable on screen.
    pub is_loading: bool,
    /// No load has succeeded yet for the current resource.
    pub is_initial_load: bool,
    /// A load is running behind already-displayed data.
    pub is_refreshing: bool,
    pub error: Option<FetchError>,
    pub last_applied_filters: FilterSet,
}

impl Default for PageViewState {
    fn default() -> Self {
        Self {
            data: None,
            is_loading: false,
            is_initial_load: true,
            is_refreshing: false,
            error: None,
            last_applied_filters: FilterSet::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadTrigger {
    ResourceChange,
    FilterChange,
    Refresh,
}

/// Orchestrates cache lookups, fetches, and state transitions for one page.
pub struct PageCoordinator {
    page: PageKind,
    kind: DataKind,
    cache: Arc<CacheStore<Payload>>,
    flights: Arc<SingleFlight<Payload, FetchError>>,
    batcher: Arc<BatchScheduler>,
    config: DataLayerConfig,
    resource: RwLock<Option<ResourceId>>,
    generation: AtomicU64,
    active_cancel: Mutex<Option<CancelToken>>,
    state: RwLock<PageViewState>,
    state_tx: watch::Sender<PageViewState>,
}

impl PageCoordinator {
    pub fn new(
        page: PageKind,
        cache: Arc<CacheStore<Payload>>,
        flights: Arc<SingleFlight<Payload, FetchError>>,
        batcher: Arc<BatchScheduler>,
        config: DataLayerConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(PageViewState::default());
        Self {
            page,
            kind: page.data_kind(),
            cache,
            flights,
            batcher,
            config,
            resource: RwLock::new(None),
            generation: AtomicU64::new(0),
            active_cancel: Mutex::new(None),
            state: RwLock::new(PageViewState::default()),
            state_tx,
        }
    }

    /// Snapshot of the current view state.
    pub fn state(&self) -> PageViewState {
        self.state.read().clone()
    }

    /// Watch channel that fires on every state transition.
    pub fn subscribe(&self) -> watch::Receiver<PageViewState> {
        self.state_tx.subscribe()
    }

    /// The resource this page currently shows, if any.
    pub fn resource(&self) -> Option<ResourceId> {
        self.resource.read().clone()
    }

    /// Select a website. A change of resource identity supersedes any
    /// in-flight fetch for the previous one.
    pub async fn set_resource(&self, resource: ResourceId) {
        {
            let current = self.resource.read();
            if current.as_ref() == Some(&resource) {
                return;
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(page = %self.page, resource = %resource, generation, "resource selected");

        if let Some(previous) = self.active_cancel.lock().take() {
            previous.cancel();
        }
        *self.resource.write() = Some(resource.clone());

        // Displayed data is cleared only when the new resource has nothing
        // cached; a fresh base entry is adopted instantly instead of
        // flashing an empty state.
        let base = RequestSignature::base(self.kind, resource);
        let adopted = self.cache.get(&base.cache_key());
        self.update_state(|state| {
            state.is_initial_load = true;
            state.is_loading = false;
            state.is_refreshing = false;
            state.error = None;
            match adopted {
                Some(value) => {
                    state.data = Some(value);
                    state.is_initial_load = false;
                }
                None => state.data = None,
            }
        });

        self.load(LoadTrigger::ResourceChange, generation).await;
    }

    /// Apply a new filter combination. Never resets `is_initial_load`; a
    /// matching cached entry is adopted without touching the network.
    pub async fn set_filters(&self, filters: FilterSet) {
        {
            let state = self.state.read();
            if state.last_applied_filters == filters {
                return;
            }
        }

        debug!(page = %self.page, filters = %filters.canonical(), "filters changed");
        self.update_state(|state| {
            state.last_applied_filters = filters;
            state.error = None;
        });

        let generation = self.generation.load(Ordering::SeqCst);
        self.load(LoadTrigger::FilterChange, generation).await;
    }

    /// Explicit user-triggered refetch, bypassing the fresh-hit
    /// short-circuit.
    pub async fn refresh(&self) {
        let generation = self.generation.load(Ordering::SeqCst);
        self.load(LoadTrigger::Refresh, generation).await;
    }

    /// Populate the cache for this page's current tuple without touching
    /// view state. Used by prefetch warmup; all failures are swallowed.
    pub async fn warm(&self) {
        let Some(resource) = self.resource() else {
            return;
        };
        let filters = self.state.read().last_applied_filters.clone();
        let sig = RequestSignature::new(self.kind, resource, filters);

        if self.cache.get(&sig.cache_key()).is_some() {
            return;
        }

        debug!(page = %self.page, key = %sig.cache_key(), "warming cache");
        match self.fetch_payload(&sig, CancelToken::new()).await {
            Ok(payload) => self.write_cache(&sig, payload),
            Err(error) => debug!(page = %self.page, error = %error, "warmup fetch failed"),
        }
    }

    /// Unmount hook: stop caring about any in-flight fetch.
    pub fn deactivate(&self) {
        if let Some(cancel) = self.active_cancel.lock().take() {
            cancel.cancel();
        }
    }

    async fn load(&self, trigger: LoadTrigger, generation: u64) {
        let Some(resource) = self.resource() else {
            return;
        };
        let filters = self.state.read().last_applied_filters.clone();

        let mut sig = RequestSignature::new(self.kind, resource.clone(), filters.clone());
        if trigger == LoadTrigger::Refresh {
            sig = sig.with_refresh();
        }
        let filtered_key = sig.cache_key();

        // Fast path, no await points: a fresh filtered entry is adopted
        // before the view can render a skeleton.
        if !sig.refresh {
            if let Some(value) = self.cache.get(&filtered_key) {
                debug!(page = %self.page, key = %filtered_key, "fresh hit, network skipped");
                self.update_state(|state| {
                    state.data = Some(value);
                    state.is_loading = false;
                    state.is_refreshing = false;
                    state.is_initial_load = false;
                    state.error = None;
                });
                return;
            }
        }

        // Interim tier: unfiltered base data for the same resource.
        let interim = if filters.is_trivial() {
            None
        } else {
            self.cache.get(&sig.base_key())
        };

        self.update_state(|state| {
            if let Some(value) = interim {
                state.data = Some(value);
                state.is_initial_load = false;
                state.is_refreshing = true;
                state.is_loading = false;
            } else if state.data.is_some() {
                state.is_refreshing = true;
                state.is_loading = false;
            } else {
                state.is_loading = true;
                state.is_refreshing = false;
            }
        });

        let cancel = CancelToken::new();
        *self.active_cancel.lock() = Some(cancel.clone());

        let result = self.fetch_payload(&sig, cancel).await;
        self.settle(sig, generation, result);
    }

    /// The shared fetch pipeline: single-flight dedup around a retried,
    /// batched remote call.
    async fn fetch_payload(
        &self,
        sig: &RequestSignature,
        cancel: CancelToken,
    ) -> Result<Payload, FetchError> {
        let batcher = Arc::clone(&self.batcher);
        let retry = self.config.retry.clone();
        let kind = self.kind;
        let group = sig.resource.as_str().to_string();
        let query = ResourceQuery::new(sig.resource.clone(), sig.filters.clone());

        self.flights
            .run(&sig.dedup_key(), move || async move {
                with_retry(&retry, || {
                    let batcher = Arc::clone(&batcher);
                    let group = group.clone();
                    let query = query.clone();
                    let cancel = cancel.clone();
                    async move { batcher.enqueue(&group, kind, query, cancel).await }
                })
                .await
            })
            .await
    }

    fn write_cache(&self, sig: &RequestSignature, payload: Payload) {
        // Trivial filters mean this IS the base tier; it gets the longer
        // ttl since it is reused across filter changes.
        let ttl = if sig.filters.is_trivial() {
            self.config.base_ttl
        } else {
            self.config.filtered_ttl
        };
        self.cache.set(
            sig.cache_key(),
            payload,
            ttl,
            sig.resource.clone(),
            [resource_tag(&sig.resource)],
        );
    }

    fn settle(
        &self,
        sig: RequestSignature,
        generation: u64,
        result: Result<Payload, FetchError>,
    ) {
        // The fetch's own keys are always valid to write back; only the
        // display update is gated on the page still being where it was.
        if let Ok(payload) = &result {
            self.write_cache(&sig, payload.clone());
        }

        let current = self.generation.load(Ordering::SeqCst);
        if generation != current {
            debug!(
                page = %self.page,
                settled = generation,
                current,
                "discarding result of a superseded resource selection"
            );
            return;
        }
        if self.state.read().last_applied_filters != sig.filters {
            debug!(page = %self.page, "discarding result of superseded filters");
            return;
        }

        match result {
            Ok(payload) => self.update_state(|state| {
                state.data = Some(payload);
                state.is_loading = false;
                state.is_refreshing = false;
                state.is_initial_load = false;
                state.error = None;
            }),
            Err(FetchError::Cancelled) => {
                // Caller-initiated; never surfaced.
                self.update_state(|state| {
                    state.is_loading = false;
                    state.is_refreshing = false;
                });
            }
            Err(error) => {
                // Keep whatever is on screen; with nothing on screen, fall
                // back to the last stale value before surfacing the error.
                let fallback = if self.state.read().data.is_none() {
                    self.cache
                        .get_stale(&sig.cache_key())
                        .or_else(|| self.cache.get_stale(&sig.base_key()))
                } else {
                    None
                };
                warn!(page = %self.page, error = %error, "fetch failed, keeping last known data");
                self.update_state(|state| {
                    if let Some(value) = fallback {
                        state.data = Some(value);
                    }
                    state.error = Some(error);
                    state.is_loading = false;
                    state.is_refreshing = false;
                });
            }
        }
    }

    fn update_state(&self, mutate: impl FnOnce(&mut PageViewState)) {
        let snapshot = {
            let mut state = self.state.write();
            mutate(&mut state);
            state.clone()
        };
        let _ = self.state_tx.send(snapshot);
    }
}
