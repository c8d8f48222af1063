use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::category::MetricCategory;

/// Label keys attached to every metric.
pub mod labels {
    pub const CLUSTER: &str = "cluster";
    pub const PID: &str = "pid";
    pub const PORT: &str = "port";
}

/// One measured value of one process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub value: f64,
}

impl Metric {
    pub fn new(category: MetricCategory, value: f64) -> Self {
        Self {
            name: category.as_str().to_string(),
            labels: HashMap::new(),
            value,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// All metrics of one category produced by a single poll tick.
///
/// The metric sequence is shared: every subscriber of the category receives
/// a clone of the same batch.
#[derive(Debug, Clone)]
pub struct MetricBatch {
    pub category: MetricCategory,
    pub timestamp: DateTime<Utc>,
    pub metrics: Arc<[Metric]>,
}

impl MetricBatch {
    pub fn new(category: MetricCategory, timestamp: DateTime<Utc>, metrics: Vec<Metric>) -> Self {
        Self {
            category,
            timestamp,
            metrics: metrics.into(),
        }
    }

    pub fn empty(category: MetricCategory, timestamp: DateTime<Utc>) -> Self {
        Self::new(category, timestamp, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.metrics.iter().map(|m| m.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_name_follows_category() {
        let m = Metric::new(MetricCategory::AvgCallTime, 1.5)
            .with_label(labels::CLUSTER, "main")
            .with_label(labels::PID, "4242");
        assert_eq!(m.name, "avg_call_time");
        assert_eq!(m.label(labels::CLUSTER), Some("main"));
        assert_eq!(m.label(labels::PORT), None);
    }

    #[test]
    fn test_batch_clone_shares_metrics() {
        let batch = MetricBatch::new(
            MetricCategory::Memory,
            Utc::now(),
            vec![
                Metric::new(MetricCategory::Memory, 100.0),
                Metric::new(MetricCategory::Memory, 200.0),
            ],
        );
        let copy = batch.clone();
        assert!(Arc::ptr_eq(&batch.metrics, &copy.metrics));
        assert_eq!(copy.values().collect::<Vec<_>>(), vec![100.0, 200.0]);
    }

    #[test]
    fn test_empty_batch() {
        let batch = MetricBatch::empty(MetricCategory::Connections, Utc::now());
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
    }
}
