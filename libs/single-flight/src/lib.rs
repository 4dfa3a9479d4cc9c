//! In-flight request deduplication
//!
//! [`SingleFlight::run`] guarantees that, for a given key, at most one
//! underlying future is in flight at any instant. Callers arriving while a
//! flight is active join it and share its outcome - success or failure -
//! without invoking their own factory. The registration is removed when the
//! flight settles, so a request issued after settlement starts a fresh
//! flight instead of replaying a finished one.
//!
//! Registration and lookup are atomic relative to each other: the registry
//! entry is checked and inserted under one shard lock, so there is no window
//! in which two callers both believe they are first.
//!
//! # Example
//!
//! ```no_run
//! use single_flight::SingleFlight;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let flights: SingleFlight<String, String> = SingleFlight::new();
//!
//! // Concurrent calls with the same key share one fetch.
//! let result = flights
//!     .run("v1:visibility:site-1:all", || async {
//!         Ok("payload".to_string())
//!     })
//!     .await;
//! # let _ = result;
//! # }
//! ```

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type SharedFlight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Registry of in-flight futures keyed by request signature.
pub struct SingleFlight<T, E> {
    in_flight: Arc<DashMap<String, SharedFlight<T, E>>>,
    started: AtomicU64,
    coalesced: AtomicU64,
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            started: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Run `factory` unless a flight for `key` is already active, in which
    /// case its outcome is shared with this caller.
    ///
    /// The factory is invoked at most once per flight, synchronously under
    /// the registry lock (it only constructs the future; nothing is polled
    /// until the caller awaits).
    pub async fn run<F, Fut>(&self, key: &str, factory: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let flight = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(existing) => {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "joining in-flight request");
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                self.started.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "starting new flight");

                let registry = Arc::clone(&self.in_flight);
                let owned_key = key.to_string();
                let inner = factory();

                let flight = async move {
                    let result = inner.await;
                    // Deregister before any waiter observes the settled
                    // result, so a later request starts a fresh flight.
                    registry.remove(&owned_key);
                    result
                }
                .boxed()
                .shared();

                slot.insert(flight.clone());
                flight
            }
        };

        flight.await
    }

    /// Number of currently registered flights.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Total flights started since construction.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Total callers that joined an existing flight instead of starting one.
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }
}

impl<T, E> Default for SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_factory_invocation() {
        let flights: Arc<SingleFlight<u32, String>> = Arc::new(SingleFlight::new());
        let invocations = Arc::new(AtomicU32::new(0));
        let gate = Arc::new(Notify::new());

        let mut handles = Vec::new();
        for _ in 0..5 {
            let flights = Arc::clone(&flights);
            let invocations = Arc::clone(&invocations);
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                flights
                    .run("sig", move || {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        async move {
                            gate.notified().await;
                            Ok(42)
                        }
                    })
                    .await
            }));
        }

        // Let every caller enqueue before the flight settles.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(flights.in_flight(), 1);
        gate.notify_waiters();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(flights.started(), 1);
        assert_eq!(flights.coalesced(), 4);
    }

    #[tokio::test]
    async fn test_failure_is_shared_by_all_waiters() {
        let flights: Arc<SingleFlight<u32, String>> = Arc::new(SingleFlight::new());
        let gate = Arc::new(Notify::new());

        let first = {
            let flights = Arc::clone(&flights);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                flights
                    .run("sig", move || async move {
                        gate.notified().await;
                        Err::<u32, _>("boom".to_string())
                    })
                    .await
            })
        };
        let second = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run("sig", || async { panic!("factory must not run twice") })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_waiters();

        assert_eq!(first.await.unwrap(), Err("boom".to_string()));
        assert_eq!(second.await.unwrap(), Err("boom".to_string()));
    }

    #[tokio::test]
    async fn test_settled_flight_is_deregistered() {
        let flights: SingleFlight<u32, String> = SingleFlight::new();

        let first = flights.run("sig", || async { Ok(1) }).await;
        assert_eq!(first, Ok(1));
        assert_eq!(flights.in_flight(), 0);

        // A request after settlement runs a fresh factory.
        let second = flights.run("sig", || async { Ok(2) }).await;
        assert_eq!(second, Ok(2));
        assert_eq!(flights.started(), 2);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let flights: SingleFlight<&'static str, String> = SingleFlight::new();

        let a = flights.run("a", || async { Ok("a") }).await;
        let b = flights.run("b", || async { Ok("b") }).await;

        assert_eq!(a, Ok("a"));
        assert_eq!(b, Ok("b"));
        assert_eq!(flights.started(), 2);
        assert_eq!(flights.coalesced(), 0);
    }
}
