//! Window-based request batching
//!
//! Requests sharing a group key accumulate in a [`BatchWindow`] that stays
//! open for a fixed delay after the FIRST enqueue - later arrivals do not
//! extend it, which bounds the worst-case latency any caller pays for
//! batching. When the window closes, the scheduler issues one grouped call
//! to the remote source per distinct [`DataKind`] in the window, dispatches
//! the groups in parallel, and settles every caller from its own result
//! only. One member's failure never fails unrelated members.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sightline_schema::{
    CancelToken, DataKind, FetchError, Payload, RemoteSource, ResourceQuery,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Default window length. Long enough to coalesce a page's burst of
/// parameter changes, short enough to stay invisible next to network time.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(50);

/// One queued request holding its own settlement continuation.
struct QueuedFetch {
    kind: DataKind,
    query: ResourceQuery,
    cancel: CancelToken,
    tx: oneshot::Sender<Result<Payload, FetchError>>,
}

/// Coalesces requests into per-group windows and demultiplexes grouped
/// responses back to the original callers.
pub struct BatchScheduler {
    source: Arc<dyn RemoteSource>,
    windows: Arc<DashMap<String, Vec<QueuedFetch>>>,
    window: Duration,
    windows_dispatched: Arc<AtomicU64>,
    grouped_calls: Arc<AtomicU64>,
}

impl BatchScheduler {
    pub fn new(source: Arc<dyn RemoteSource>) -> Self {
        Self::with_window(source, DEFAULT_WINDOW)
    }

    pub fn with_window(source: Arc<dyn RemoteSource>, window: Duration) -> Self {
        Self {
            source,
            windows: Arc::new(DashMap::new()),
            window,
            windows_dispatched: Arc::new(AtomicU64::new(0)),
            grouped_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue one request into the window for `group_key` and await its
    /// individual outcome.
    pub async fn enqueue(
        &self,
        group_key: &str,
        kind: DataKind,
        query: ResourceQuery,
        cancel: CancelToken,
    ) -> Result<Payload, FetchError> {
        let (tx, rx) = oneshot::channel();
        let queued = QueuedFetch {
            kind,
            query,
            cancel,
            tx,
        };

        let opened_window = match self.windows.entry(group_key.to_string()) {
            Entry::Occupied(mut window) => {
                window.get_mut().push(queued);
                debug!(group = %group_key, queued = window.get().len(), "joined batch window");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(vec![queued]);
                debug!(group = %group_key, "opened batch window");
                true
            }
        };

        if opened_window {
            // The timer is anchored to this first enqueue; later arrivals
            // ride the same deadline.
            let windows = Arc::clone(&self.windows);
            let source = Arc::clone(&self.source);
            let dispatched = Arc::clone(&self.windows_dispatched);
            let grouped = Arc::clone(&self.grouped_calls);
            let delay = self.window;
            let group = group_key.to_string();

            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some((_, queued)) = windows.remove(&group) {
                    dispatched.fetch_add(1, Ordering::Relaxed);
                    debug!(group = %group, size = queued.len(), "dispatching batch window");
                    dispatch_window(source, queued, grouped).await;
                }
            });
        }

        // A dropped sender means the dispatch task died before settling us;
        // surface it as a retryable failure rather than hanging the caller.
        rx.await
            .unwrap_or_else(|_| Err(FetchError::Transient("batch dispatch dropped".to_string())))
    }

    /// Windows currently accumulating requests.
    pub fn open_windows(&self) -> usize {
        self.windows.len()
    }

    /// Windows dispatched since construction.
    pub fn windows_dispatched(&self) -> u64 {
        self.windows_dispatched.load(Ordering::Relaxed)
    }

    /// Grouped remote calls issued since construction.
    pub fn grouped_calls(&self) -> u64 {
        self.grouped_calls.load(Ordering::Relaxed)
    }
}

/// Settle every member of a closed window. Never propagates an error
/// upward - each member's continuation settles independently.
async fn dispatch_window(
    source: Arc<dyn RemoteSource>,
    queued: Vec<QueuedFetch>,
    grouped_calls: Arc<AtomicU64>,
) {
    // Members cancelled while waiting in the window are settled up front
    // and excluded from the grouped calls.
    let mut by_kind: HashMap<DataKind, Vec<QueuedFetch>> = HashMap::new();
    for fetch in queued {
        if fetch.cancel.is_cancelled() {
            let _ = fetch.tx.send(Err(FetchError::Cancelled));
            continue;
        }
        by_kind.entry(fetch.kind).or_default().push(fetch);
    }

    let groups = by_kind.into_iter().map(|(kind, members)| {
        let source = Arc::clone(&source);
        let grouped_calls = Arc::clone(&grouped_calls);
        async move {
            grouped_calls.fetch_add(1, Ordering::Relaxed);
            let queries: Vec<ResourceQuery> =
                members.iter().map(|m| m.query.clone()).collect();

            let results = source
                .fetch_group(kind, queries, CancelToken::new())
                .await;

            let expected = members.len();
            let received = results.len();
            let mut results = results.into_iter();

            for member in members {
                let outcome = results.next().unwrap_or_else(|| {
                    Err(FetchError::Upstream(format!(
                        "grouped response size mismatch: expected {expected}, got {received}"
                    )))
                });
                // Receiver may have been dropped; that caller no longer cares.
                let _ = member.tx.send(outcome);
            }
        }
    });

    futures::future::join_all(groups).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use sightline_schema::{FilterSet, ResourceId};
    use std::time::Instant;

    /// Scripted source: records grouped calls, fails resources on request.
    struct ScriptedSource {
        calls: Mutex<Vec<(DataKind, usize)>>,
        fail_resources: Vec<&'static str>,
        fail_kinds: Vec<DataKind>,
    }

    impl ScriptedSource {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_resources: Vec::new(),
                fail_kinds: Vec::new(),
            }
        }

        fn failing_resource(mut self, resource: &'static str) -> Self {
            self.fail_resources.push(resource);
            self
        }

        fn failing_kind(mut self, kind: DataKind) -> Self {
            self.fail_kinds.push(kind);
            self
        }

        fn grouped_calls(&self) -> Vec<(DataKind, usize)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait::async_trait]
    impl RemoteSource for ScriptedSource {
        async fn fetch(
            &self,
            kind: DataKind,
            query: ResourceQuery,
            _cancel: CancelToken,
        ) -> Result<Payload, FetchError> {
            if self.fail_kinds.contains(&kind) {
                return Err(FetchError::Transient(format!("{kind} endpoint down")));
            }
            if self.fail_resources.contains(&query.resource.as_str()) {
                return Err(FetchError::Upstream(format!(
                    "no data for {}",
                    query.resource
                )));
            }
            Ok(serde_json::json!({
                "kind": kind.to_string(),
                "resource": query.resource.as_str(),
            }))
        }

        async fn fetch_group(
            &self,
            kind: DataKind,
            queries: Vec<ResourceQuery>,
            cancel: CancelToken,
        ) -> Vec<Result<Payload, FetchError>> {
            self.calls.lock().push((kind, queries.len()));
            let mut results = Vec::with_capacity(queries.len());
            for query in queries {
                results.push(self.fetch(kind, query, cancel.clone()).await);
            }
            results
        }
    }

    fn query(resource: &str) -> ResourceQuery {
        ResourceQuery::new(ResourceId::new(resource), FilterSet::default())
    }

    #[tokio::test]
    async fn test_same_group_one_dispatch_per_kind() {
        let source = Arc::new(ScriptedSource::new());
        let batcher = Arc::new(BatchScheduler::with_window(
            Arc::clone(&source) as Arc<dyn RemoteSource>,
            Duration::from_millis(30),
        ));

        let mut handles = Vec::new();
        for (kind, resource) in [
            (DataKind::Visibility, "site-1"),
            (DataKind::Visibility, "site-2"),
            (DataKind::Topics, "site-1"),
        ] {
            let batcher = Arc::clone(&batcher);
            handles.push(tokio::spawn(async move {
                batcher
                    .enqueue("dashboard", kind, query(resource), CancelToken::new())
                    .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        let mut calls = source.grouped_calls();
        calls.sort_by_key(|(kind, _)| format!("{kind}"));
        assert_eq!(
            calls,
            vec![(DataKind::Topics, 1), (DataKind::Visibility, 2)]
        );
        assert_eq!(batcher.windows_dispatched(), 1);
    }

    #[tokio::test]
    async fn test_window_anchored_to_first_enqueue() {
        let source = Arc::new(ScriptedSource::new());
        let batcher = Arc::new(BatchScheduler::with_window(
            Arc::clone(&source) as Arc<dyn RemoteSource>,
            Duration::from_millis(60),
        ));

        let started = Instant::now();
        let first = {
            let batcher = Arc::clone(&batcher);
            tokio::spawn(async move {
                batcher
                    .enqueue("g", DataKind::Visibility, query("site-1"), CancelToken::new())
                    .await
            })
        };

        // A second caller joins mid-window; it must not extend the deadline.
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = {
            let batcher = Arc::clone(&batcher);
            tokio::spawn(async move {
                batcher
                    .enqueue("g", DataKind::Visibility, query("site-2"), CancelToken::new())
                    .await
            })
        };

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(60));
        assert!(
            elapsed < Duration::from_millis(150),
            "window was extended: {elapsed:?}"
        );
        assert_eq!(source.grouped_calls(), vec![(DataKind::Visibility, 2)]);
    }

    #[tokio::test]
    async fn test_member_failure_is_isolated() {
        let source = Arc::new(ScriptedSource::new().failing_resource("site-2"));
        let batcher = Arc::new(BatchScheduler::with_window(
            Arc::clone(&source) as Arc<dyn RemoteSource>,
            Duration::from_millis(20),
        ));

        let ok = {
            let batcher = Arc::clone(&batcher);
            tokio::spawn(async move {
                batcher
                    .enqueue("g", DataKind::Competitors, query("site-1"), CancelToken::new())
                    .await
            })
        };
        let failing = {
            let batcher = Arc::clone(&batcher);
            tokio::spawn(async move {
                batcher
                    .enqueue("g", DataKind::Competitors, query("site-2"), CancelToken::new())
                    .await
            })
        };

        assert!(ok.await.unwrap().is_ok());
        assert!(matches!(
            failing.await.unwrap(),
            Err(FetchError::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn test_kind_failure_spares_other_kinds() {
        let source = Arc::new(ScriptedSource::new().failing_kind(DataKind::Topics));
        let batcher = Arc::new(BatchScheduler::with_window(
            Arc::clone(&source) as Arc<dyn RemoteSource>,
            Duration::from_millis(20),
        ));

        let visibility = {
            let batcher = Arc::clone(&batcher);
            tokio::spawn(async move {
                batcher
                    .enqueue("g", DataKind::Visibility, query("site-1"), CancelToken::new())
                    .await
            })
        };
        let topics = {
            let batcher = Arc::clone(&batcher);
            tokio::spawn(async move {
                batcher
                    .enqueue("g", DataKind::Topics, query("site-1"), CancelToken::new())
                    .await
            })
        };

        assert!(visibility.await.unwrap().is_ok());
        assert!(matches!(
            topics.await.unwrap(),
            Err(FetchError::Transient(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_member_rejected_before_dispatch() {
        let source = Arc::new(ScriptedSource::new());
        let batcher = Arc::new(BatchScheduler::with_window(
            Arc::clone(&source) as Arc<dyn RemoteSource>,
            Duration::from_millis(30),
        ));

        let cancel = CancelToken::new();
        let cancelled = {
            let batcher = Arc::clone(&batcher);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                batcher
                    .enqueue("g", DataKind::Visibility, query("site-1"), cancel)
                    .await
            })
        };
        let live = {
            let batcher = Arc::clone(&batcher);
            tokio::spawn(async move {
                batcher
                    .enqueue("g", DataKind::Visibility, query("site-2"), CancelToken::new())
                    .await
            })
        };

        cancel.cancel();

        assert_eq!(cancelled.await.unwrap(), Err(FetchError::Cancelled));
        assert!(live.await.unwrap().is_ok());
        // The cancelled member never reached the remote source.
        assert_eq!(source.grouped_calls(), vec![(DataKind::Visibility, 1)]);
    }
}
