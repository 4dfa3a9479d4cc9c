//! Closed filter schema and canonical serialization
//!
//! Filters narrow a resource's data (date range, competitor set, topic,
//! sort order, row limit). The canonical form has a fixed field order so two
//! logically identical filter sets always produce the same string, no matter
//! how they were constructed. That string participates in cache keys and
//! dedup keys only; it is not a wire format.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Reporting period selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    Day7,
    Day30,
    Day90,
    Custom { from: NaiveDate, to: NaiveDate },
}

impl Period {
    fn canonical(&self) -> String {
        match self {
            Period::Day7 => "7d".to_string(),
            Period::Day30 => "30d".to_string(),
            Period::Day90 => "90d".to_string(),
            Period::Custom { from, to } => format!("{}..{}", from, to),
        }
    }
}

/// Sort order for tabular views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    VisibilityDesc,
    VisibilityAsc,
    MentionsDesc,
    MentionsAsc,
    NameAsc,
}

impl SortOrder {
    fn canonical(&self) -> &'static str {
        match self {
            SortOrder::VisibilityDesc => "visibility_desc",
            SortOrder::VisibilityAsc => "visibility_asc",
            SortOrder::MentionsDesc => "mentions_desc",
            SortOrder::MentionsAsc => "mentions_asc",
            SortOrder::NameAsc => "name_asc",
        }
    }
}

/// The full set of secondary query parameters a page can apply.
///
/// # Example
///
/// ```
/// use sightline_schema::{FilterSet, Period};
///
/// let filters = FilterSet {
///     period: Some(Period::Day7),
///     ..Default::default()
/// };
/// assert_eq!(filters.canonical(), "period=7d");
/// assert!(!filters.is_trivial());
/// assert_eq!(FilterSet::default().canonical(), "all");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSet {
    pub period: Option<Period>,
    pub competitor_set: Option<String>,
    pub topic: Option<String>,
    pub sort: Option<SortOrder>,
    pub limit: Option<u32>,
}

impl FilterSet {
    /// True when no filter is applied and the request targets the full,
    /// unfiltered resource data.
    pub fn is_trivial(&self) -> bool {
        self.period.is_none()
            && self.competitor_set.is_none()
            && self.topic.is_none()
            && self.sort.is_none()
            && self.limit.is_none()
    }

    /// Deterministic canonical form. Field order is fixed; absent fields are
    /// skipped; the trivial set renders as `all`.
    pub fn canonical(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(period) = &self.period {
            parts.push(format!("period={}", period.canonical()));
        }
        if let Some(set) = &self.competitor_set {
            parts.push(format!("competitors={}", set));
        }
        if let Some(topic) = &self.topic {
            parts.push(format!("topic={}", topic));
        }
        if let Some(sort) = &self.sort {
            parts.push(format!("sort={}", sort.canonical()));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("limit={}", limit));
        }

        if parts.is_empty() {
            "all".to_string()
        } else {
            parts.join(";")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trivial_filters() {
        let filters = FilterSet::default();
        assert!(filters.is_trivial());
        assert_eq!(filters.canonical(), "all");
    }

    #[test]
    fn test_canonical_field_order_is_fixed() {
        // Same logical filters, fields assigned in different order.
        let mut a = FilterSet::default();
        a.limit = Some(10);
        a.period = Some(Period::Day30);

        let mut b = FilterSet::default();
        b.period = Some(Period::Day30);
        b.limit = Some(10);

        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.canonical(), "period=30d;limit=10");
    }

    #[test]
    fn test_canonical_full_set() {
        let filters = FilterSet {
            period: Some(Period::Day7),
            competitor_set: Some("default".to_string()),
            topic: Some("pricing".to_string()),
            sort: Some(SortOrder::VisibilityDesc),
            limit: Some(25),
        };

        assert_eq!(
            filters.canonical(),
            "period=7d;competitors=default;topic=pricing;sort=visibility_desc;limit=25"
        );
    }

    #[test]
    fn test_custom_period_canonical() {
        let filters = FilterSet {
            period: Some(Period::Custom {
                from: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                to: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            }),
            ..Default::default()
        };

        assert_eq!(filters.canonical(), "period=2026-01-01..2026-01-31");
    }

    #[test]
    fn test_filters_serde_roundtrip() {
        let filters = FilterSet {
            period: Some(Period::Day90),
            sort: Some(SortOrder::MentionsAsc),
            ..Default::default()
        };

        let json = serde_json::to_string(&filters).unwrap();
        let back: FilterSet = serde_json::from_str(&json).unwrap();
        assert_eq!(filters, back);
    }
}
