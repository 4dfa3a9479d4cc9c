//! Navigation-based prefetch prediction
//!
//! Counts page-to-page transitions and, once a pattern has enough samples,
//! names the most likely next page so the orchestrator can warm its cache
//! ahead of the click. Purely advisory: wrong predictions cost one cheap
//! background fetch, missed ones cost nothing.

use crate::page::PageKind;
use dashmap::DashMap;
use tracing::debug;

pub struct PrefetchPredictor {
    transitions: DashMap<(PageKind, PageKind), u64>,
    min_samples: u64,
}

impl PrefetchPredictor {
    pub fn new(min_samples: u64) -> Self {
        Self {
            transitions: DashMap::new(),
            min_samples,
        }
    }

    /// Record one observed navigation.
    pub fn record(&self, from: PageKind, to: PageKind) {
        if from == to {
            return;
        }
        let mut count = self.transitions.entry((from, to)).or_insert(0);
        *count += 1;
        debug!(%from, %to, count = *count, "navigation recorded");
    }

    /// Most frequent successor of `from`, once it has been seen at least
    /// `min_samples` times. Ties resolve to the first maximum encountered.
    pub fn predict(&self, from: PageKind) -> Option<PageKind> {
        let mut best: Option<(PageKind, u64)> = None;

        for entry in self.transitions.iter() {
            let ((origin, target), count) = (*entry.key(), *entry.value());
            if origin != from || count < self.min_samples {
                continue;
            }
            if best.map(|(_, best_count)| count > best_count).unwrap_or(true) {
                best = Some((target, count));
            }
        }

        best.map(|(target, _)| target)
    }

    /// Total transitions recorded for `from`, across all targets.
    pub fn samples_from(&self, from: PageKind) -> u64 {
        self.transitions
            .iter()
            .filter(|entry| entry.key().0 == from)
            .map(|entry| *entry.value())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_prediction_below_sample_threshold() {
        let predictor = PrefetchPredictor::new(3);

        predictor.record(PageKind::Dashboard, PageKind::Competitors);
        predictor.record(PageKind::Dashboard, PageKind::Competitors);

        assert_eq!(predictor.predict(PageKind::Dashboard), None);
    }

    #[test]
    fn test_most_frequent_successor_wins() {
        let predictor = PrefetchPredictor::new(2);

        for _ in 0..5 {
            predictor.record(PageKind::Dashboard, PageKind::Analysis);
        }
        for _ in 0..2 {
            predictor.record(PageKind::Dashboard, PageKind::Competitors);
        }

        assert_eq!(predictor.predict(PageKind::Dashboard), Some(PageKind::Analysis));
    }

    #[test]
    fn test_predictions_scoped_to_origin_page() {
        let predictor = PrefetchPredictor::new(1);

        predictor.record(PageKind::Dashboard, PageKind::Analysis);
        predictor.record(PageKind::Competitors, PageKind::Websites);

        assert_eq!(predictor.predict(PageKind::Dashboard), Some(PageKind::Analysis));
        assert_eq!(predictor.predict(PageKind::Competitors), Some(PageKind::Websites));
        assert_eq!(predictor.predict(PageKind::Websites), None);
    }

    #[test]
    fn test_self_transitions_ignored() {
        let predictor = PrefetchPredictor::new(1);

        predictor.record(PageKind::Dashboard, PageKind::Dashboard);

        assert_eq!(predictor.predict(PageKind::Dashboard), None);
        assert_eq!(predictor.samples_from(PageKind::Dashboard), 0);
    }
}
