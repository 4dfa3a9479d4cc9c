//! Canonical request signatures
//!
//! Key format: `v{VERSION}:{kind}:{resource}:{filters}`, versioned the same
//! way as the remote API's cache schema so a format change invalidates every
//! stale key at once.

use crate::{DataKind, FilterSet, ResourceId};

/// Signature schema version - increment when changing the key format.
pub const SCHEMA_VERSION: u32 = 1;

/// Canonical identity of one logical request.
///
/// Two requests for the same resource with the same filters always normalize
/// to the same signature regardless of how the filter set was built. The
/// `refresh` marker participates in deduplication identity but not in the
/// cache key: an explicit refresh may share a flight with an identical
/// in-progress refresh, never with a plain read that started earlier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature {
    pub kind: DataKind,
    pub resource: ResourceId,
    pub filters: FilterSet,
    pub refresh: bool,
}

impl RequestSignature {
    pub fn new(kind: DataKind, resource: ResourceId, filters: FilterSet) -> Self {
        Self {
            kind,
            resource,
            filters,
            refresh: false,
        }
    }

    /// Signature for the unfiltered base data of a resource.
    pub fn base(kind: DataKind, resource: ResourceId) -> Self {
        Self::new(kind, resource, FilterSet::default())
    }

    pub fn with_refresh(mut self) -> Self {
        self.refresh = true;
        self
    }

    /// Cache key. Ignores the refresh marker: a refreshed payload overwrites
    /// the same entry a plain read would populate.
    pub fn cache_key(&self) -> String {
        format!(
            "v{}:{}:{}:{}",
            SCHEMA_VERSION,
            self.kind,
            self.resource,
            self.filters.canonical()
        )
    }

    /// Deduplication key. Refresh flights are kept distinct from plain reads.
    pub fn dedup_key(&self) -> String {
        if self.refresh {
            format!("{}#refresh", self.cache_key())
        } else {
            self.cache_key()
        }
    }

    /// Cache key of this signature's unfiltered base tier.
    pub fn base_key(&self) -> String {
        RequestSignature::base(self.kind, self.resource.clone()).cache_key()
    }
}

/// Dependency tag carried by every cache entry belonging to a resource.
/// Invalidation events address entries through this tag.
pub fn resource_tag(resource: &ResourceId) -> String {
    format!("resource:{}", resource)
}
