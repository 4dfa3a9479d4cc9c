//! Example: a dashboard browsing session against a simulated backend
//!
//! Walks through the load strategies a real session exercises: first visit,
//! filter changes, instant cache hits, deduplicated refreshes, and an
//! out-of-band crawl completion that reloads the displayed page.
//! Run with: cargo run --example dashboard_session

use sightline_data::{DataHub, DataLayerConfig, PageKind};
use sightline_schema::{
    CancelToken, CrawlStatus, DataKind, FetchError, FilterSet, Payload, Period, RemoteSource,
    ResourceId, ResourceQuery, StatusEvent,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Simulated remote API: ~80ms per call, counts how often it is hit.
struct SimulatedApi {
    calls: AtomicU64,
}

#[async_trait::async_trait]
impl RemoteSource for SimulatedApi {
    async fn fetch(
        &self,
        kind: DataKind,
        query: ResourceQuery,
        cancel: CancelToken,
    ) -> Result<Payload, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(80)).await;
        cancel.check()?;

        Ok(serde_json::json!({
            "kind": kind.to_string(),
            "resource": query.resource.as_str(),
            "filters": query.filters.canonical(),
            "call": call,
        }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let api = Arc::new(SimulatedApi {
        calls: AtomicU64::new(0),
    });
    let hub = DataHub::new(
        Arc::clone(&api) as Arc<dyn RemoteSource>,
        DataLayerConfig::from_env()?,
    );

    println!("=== First visit: dashboard for site-1 ===");
    let dashboard = hub.navigate(PageKind::Dashboard);
    dashboard.set_resource(ResourceId::new("site-1")).await;
    println!(
        "loaded: {} (remote calls so far: {})",
        dashboard.state().data.unwrap(),
        api.calls.load(Ordering::SeqCst)
    );

    println!("\n=== Narrow to the last 7 days ===");
    dashboard
        .set_filters(FilterSet {
            period: Some(Period::Day7),
            ..Default::default()
        })
        .await;
    println!(
        "loaded: {} (remote calls so far: {})",
        dashboard.state().data.unwrap(),
        api.calls.load(Ordering::SeqCst)
    );

    println!("\n=== Back to the unfiltered view: served from cache ===");
    dashboard.set_filters(FilterSet::default()).await;
    println!(
        "loaded with no new remote call: {} (remote calls so far: {})",
        dashboard.state().data.unwrap(),
        api.calls.load(Ordering::SeqCst)
    );

    println!("\n=== Two refresh clicks in quick succession share one fetch ===");
    let first = {
        let page = hub.page(PageKind::Dashboard);
        tokio::spawn(async move { page.refresh().await })
    };
    let second = {
        let page = hub.page(PageKind::Dashboard);
        tokio::spawn(async move { page.refresh().await })
    };
    first.await?;
    second.await?;
    println!(
        "both settled from one flight (remote calls so far: {})",
        api.calls.load(Ordering::SeqCst)
    );

    println!("\n=== Crawl completes out of band: displayed page reloads ===");
    hub.bus().publish(StatusEvent::new(
        ResourceId::new("site-1"),
        CrawlStatus::Completed,
    ));
    tokio::time::sleep(Duration::from_millis(300)).await;
    println!(
        "refreshed: {} (remote calls so far: {})",
        dashboard.state().data.unwrap(),
        api.calls.load(Ordering::SeqCst)
    );

    hub.shutdown();
    Ok(())
}
