//! Page data coordination for the Sightline dashboard
//!
//! Decides, for every page and every parameter change, whether to serve
//! data straight from cache, issue a deduplicated and batched fetch, or
//! adopt interim data while a narrower fetch runs in the background - and
//! keeps displayed data coherent when crawl status events invalidate the
//! cache out of band.
//!
//! # Wiring
//!
//! [`DataHub::new`] constructs the whole layer around an injected
//! [`RemoteSource`](sightline_schema::RemoteSource): one shared
//! [`CacheStore`](sightline_cache::CacheStore), one
//! [`SingleFlight`](single_flight::SingleFlight) registry, one
//! [`BatchScheduler`](batch_window::BatchScheduler), the status bus plus
//! invalidation bridge, and a [`PageCoordinator`] per page. Views talk to
//! their page coordinator only.

mod config;
mod hub;
mod page;
mod prefetch;
mod retry;

pub use config::DataLayerConfig;
pub use hub::DataHub;
pub use page::{PageCoordinator, PageKind, PageViewState};
pub use prefetch::PrefetchPredictor;
pub use retry::{with_retry, RetryConfig};
