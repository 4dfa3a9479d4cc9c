//! Remote data source contract
//!
//! The data layer's only view of the backend. Implementations must be
//! idempotent-safe to retry and must honor cooperative cancellation; a
//! source that cannot abort mid-flight may finish anyway, in which case the
//! caller discards the result through its generation check.

use crate::{CancelToken, DataKind, FetchError, FilterSet, Payload, ResourceId};

/// One resource + filter combination inside a grouped fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceQuery {
    pub resource: ResourceId,
    pub filters: FilterSet,
}

impl ResourceQuery {
    pub fn new(resource: ResourceId, filters: FilterSet) -> Self {
        Self { resource, filters }
    }
}

#[async_trait::async_trait]
pub trait RemoteSource: Send + Sync + 'static {
    /// Fetch data for a single resource/filter combination.
    async fn fetch(
        &self,
        kind: DataKind,
        query: ResourceQuery,
        cancel: CancelToken,
    ) -> Result<Payload, FetchError>;

    /// Fetch a group of queries of the same kind in one round trip.
    ///
    /// Returns exactly one result per query, in input order. The default
    /// implementation fans out to [`RemoteSource::fetch`] concurrently;
    /// sources with a true batch endpoint override it.
    async fn fetch_group(
        &self,
        kind: DataKind,
        queries: Vec<ResourceQuery>,
        cancel: CancelToken,
    ) -> Vec<Result<Payload, FetchError>> {
        let futs = queries
            .into_iter()
            .map(|query| self.fetch(kind, query, cancel.clone()));
        futures::future::join_all(futs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoSource;

    #[async_trait::async_trait]
    impl RemoteSource for EchoSource {
        async fn fetch(
            &self,
            kind: DataKind,
            query: ResourceQuery,
            cancel: CancelToken,
        ) -> Result<Payload, FetchError> {
            cancel.check()?;
            Ok(serde_json::json!({
                "kind": kind.to_string(),
                "resource": query.resource.as_str(),
            }))
        }
    }

    #[tokio::test]
    async fn test_default_group_preserves_order() {
        let source = EchoSource;
        let queries = vec![
            ResourceQuery::new(ResourceId::new("site-1"), FilterSet::default()),
            ResourceQuery::new(ResourceId::new("site-2"), FilterSet::default()),
        ];

        let results = source
            .fetch_group(DataKind::Visibility, queries, CancelToken::new())
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].as_ref().unwrap()["resource"],
            serde_json::json!("site-1")
        );
        assert_eq!(
            results[1].as_ref().unwrap()["resource"],
            serde_json::json!("site-2")
        );
    }

    #[tokio::test]
    async fn test_cancelled_token_rejects() {
        let source = EchoSource;
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = source
            .fetch(
                DataKind::Topics,
                ResourceQuery::new(ResourceId::new("site-1"), FilterSet::default()),
                cancel,
            )
            .await;

        assert_eq!(result, Err(FetchError::Cancelled));
    }
}
