//! Cache metrics for observability

use prometheus::{CounterVec, IntCounter, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<CacheMetricsInner> = OnceLock::new();

struct CacheMetricsInner {
    hits: CounterVec,
    misses: CounterVec,
    writes: CounterVec,
    invalidations: IntCounter,
    swept: IntCounter,
}

impl CacheMetricsInner {
    fn new() -> Self {
        Self {
            hits: CounterVec::new(
                Opts::new("sightline_cache_hits_total", "Total cache hits"),
                &["kind"],
            )
            .expect("valid metric definition"),
            misses: CounterVec::new(
                Opts::new("sightline_cache_misses_total", "Total cache misses"),
                &["kind"],
            )
            .expect("valid metric definition"),
            writes: CounterVec::new(
                Opts::new("sightline_cache_writes_total", "Total cache writes"),
                &["kind"],
            )
            .expect("valid metric definition"),
            invalidations: IntCounter::new(
                "sightline_cache_invalidations_total",
                "Total entries demoted by invalidation",
            )
            .expect("valid metric definition"),
            swept: IntCounter::new(
                "sightline_cache_swept_total",
                "Total entries removed by sweep",
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.hits.clone()))?;
        registry.register(Box::new(self.misses.clone()))?;
        registry.register(Box::new(self.writes.clone()))?;
        registry.register(Box::new(self.invalidations.clone()))?;
        registry.register(Box::new(self.swept.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static CacheMetricsInner {
    METRICS.get_or_init(CacheMetricsInner::new)
}

/// Extract the data kind from a cache key for metrics labeling.
fn extract_kind(key: &str) -> &str {
    // Format: v{N}:{kind}:{resource}:{filters}
    let mut parts = key.split(':');
    match (parts.next(), parts.next()) {
        (Some(_), Some(kind)) if !kind.is_empty() => kind,
        _ => "unknown",
    }
}

/// Cache metrics wrapper
#[derive(Clone, Default)]
pub struct CacheMetrics;

impl CacheMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry.
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_hit(&self, key: &str) {
        let kind = extract_kind(key);
        get_metrics().hits.with_label_values(&[kind]).inc();
    }

    pub fn record_miss(&self, key: &str) {
        let kind = extract_kind(key);
        get_metrics().misses.with_label_values(&[kind]).inc();
    }

    pub fn record_write(&self, key: &str) {
        let kind = extract_kind(key);
        get_metrics().writes.with_label_values(&[kind]).inc();
    }

    pub fn record_invalidation(&self, count: usize) {
        get_metrics().invalidations.inc_by(count as u64);
    }

    pub fn record_sweep(&self, count: usize) {
        get_metrics().swept.inc_by(count as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_kind() {
        assert_eq!(extract_kind("v1:visibility:site-1:all"), "visibility");
        assert_eq!(extract_kind("v1:topics:site-1:period=7d"), "topics");
        assert_eq!(extract_kind("malformed"), "unknown");
    }
}
