//! Shared schema for the Sightline client data layer
//!
//! Every crate in the workspace speaks these types:
//! - Resource identity and data kinds ([`ResourceId`], [`DataKind`])
//! - The closed filter schema and its canonical serialization ([`FilterSet`])
//! - Request signatures used for caching and deduplication ([`RequestSignature`])
//! - The fetch error taxonomy ([`FetchError`])
//! - Cooperative cancellation tokens ([`CancelToken`])
//! - The remote data source contract ([`RemoteSource`])
//! - Crawl status events pushed by the monitoring subsystem ([`StatusEvent`])

mod cancel;
mod error;
mod events;
mod filters;
mod signature;
mod source;

pub use cancel::CancelToken;
pub use error::FetchError;
pub use events::{CrawlStatus, StatusEvent};
pub use filters::{FilterSet, Period, SortOrder};
pub use signature::{resource_tag, RequestSignature, SCHEMA_VERSION};
pub use source::{RemoteSource, ResourceQuery};

use serde::{Deserialize, Serialize};

/// Chart-agnostic response payload. The data layer never inspects the shape;
/// downstream views do.
pub type Payload = serde_json::Value;

/// Identifier of the website a page is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Data domains served by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    Visibility,
    Competitors,
    Topics,
    Prompts,
    Websites,
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataKind::Visibility => write!(f, "visibility"),
            DataKind::Competitors => write!(f, "competitors"),
            DataKind::Topics => write!(f, "topics"),
            DataKind::Prompts => write!(f, "prompts"),
            DataKind::Websites => write!(f, "websites"),
        }
    }
}
