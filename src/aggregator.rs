//! Per-decision store of the final insight each role contributed.

use crate::domain::{Insight, RoleId};
use dashmap::DashMap;
use std::collections::BTreeMap;

/// Point-in-time copy of the aggregator, ordered by role id.
pub type InsightSnapshot = BTreeMap<RoleId, Insight>;

/// Concurrent map from role id to that role's insight.
///
/// Writes to different roles never block each other.
#[derive(Debug, Default)]
pub struct InsightAggregator {
    insights: DashMap<RoleId, Insight>,
}

impl InsightAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the insight under its role, returning the one it replaced.
    pub fn record(&self, insight: Insight) -> Option<Insight> {
        let previous = self.insights.insert(insight.role.clone(), insight);
        if let Some(previous) = &previous {
            tracing::debug!(role = %previous.role, "Insight overwritten");
        }
        previous
    }

    pub fn get(&self, role: &RoleId) -> Option<Insight> {
        self.insights.get(role).map(|entry| entry.value().clone())
    }

    pub fn snapshot(&self) -> InsightSnapshot {
        self.insights
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.insights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Confidence;
    use std::sync::Arc;

    fn insight(role: &str, summary: &str) -> Insight {
        Insight::new(RoleId::from(role), summary, Confidence::from(0.5))
    }

    #[test]
    fn test_later_insight_overwrites_earlier() {
        let aggregator = InsightAggregator::new();
        assert!(aggregator.record(insight("risk", "first")).is_none());
        let previous = aggregator.record(insight("risk", "second"));
        assert_eq!(previous.unwrap().summary, "first");
        assert_eq!(aggregator.len(), 1);
        assert_eq!(aggregator.get(&RoleId::from("risk")).unwrap().summary, "second");
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let aggregator = InsightAggregator::new();
        aggregator.record(insight("b", "b"));
        aggregator.record(insight("a", "a"));
        let snapshot = aggregator.snapshot();
        aggregator.record(insight("c", "c"));

        let keys: Vec<&str> = snapshot.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(aggregator.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_on_distinct_keys() {
        let aggregator = Arc::new(InsightAggregator::new());
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let aggregator = aggregator.clone();
                tokio::spawn(async move {
                    aggregator.record(insight(&format!("role-{}", i), "done"));
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(aggregator.len(), 16);
        assert!(!aggregator.is_empty());
    }
}
