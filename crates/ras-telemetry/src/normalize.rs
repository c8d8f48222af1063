//! Turns process records into categorized metrics.

use std::collections::HashMap;

use ras_client::{ClusterInfo, ProcessInfo};
use ras_monitor::{labels, Metric, MetricCategory};

/// Metrics of one tick, grouped by category in [`MetricCategory::ALL`] order.
pub type Grouped = [Vec<Metric>; 7];

/// Raw value of `category` for a process.
pub fn category_value(process: &ProcessInfo, category: MetricCategory) -> f64 {
    match category {
        MetricCategory::Memory => process.memory_size as f64,
        MetricCategory::Connections => process.connections as f64,
        MetricCategory::AvgThreads => process.avg_threads,
        MetricCategory::AvgCallTime => process.avg_call_time,
        MetricCategory::SelectionSize => process.selection_size as f64,
        MetricCategory::AvgDbCallTime => process.avg_db_call_time,
        MetricCategory::AvgServerCallTime => process.avg_server_call_time,
    }
}

/// Labels identifying where a process runs.
pub fn process_labels(cluster: &ClusterInfo, process: &ProcessInfo) -> HashMap<String, String> {
    HashMap::from([
        (labels::CLUSTER.to_string(), cluster.name.clone()),
        (labels::PID.to_string(), process.pid.clone()),
        (labels::PORT.to_string(), process.port.to_string()),
    ])
}

/// Append one metric per category for `process` to `grouped`.
///
/// A value that is not finite cannot be a measurement; that metric is left
/// out. Returns the categories that were left out.
pub fn push_process(
    grouped: &mut Grouped,
    cluster: &ClusterInfo,
    process: &ProcessInfo,
) -> Vec<MetricCategory> {
    let labels = process_labels(cluster, process);
    let mut malformed = Vec::new();

    for category in MetricCategory::ALL {
        let value = category_value(process, category);
        if !value.is_finite() {
            malformed.push(category);
            continue;
        }
        grouped[category.index()].push(Metric::new(category, value).with_labels(labels.clone()));
    }

    malformed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(pid: &str, port: u16, memory: i64, connections: i64) -> ProcessInfo {
        ProcessInfo {
            memory_size: memory,
            connections,
            avg_threads: 1.5,
            avg_call_time: 0.25,
            selection_size: 12,
            avg_db_call_time: 0.125,
            avg_server_call_time: 0.0625,
            ..ProcessInfo::new(pid, port)
        }
    }

    #[test]
    fn test_one_metric_per_category() {
        let cluster = ClusterInfo::new("c-1", "main");
        let mut grouped = Grouped::default();

        let malformed = push_process(&mut grouped, &cluster, &process("101", 1560, 100, 5));
        assert!(malformed.is_empty());

        for category in MetricCategory::ALL {
            let metrics = &grouped[category.index()];
            assert_eq!(metrics.len(), 1);
            assert_eq!(metrics[0].name, category.as_str());
            assert_eq!(metrics[0].label(labels::CLUSTER), Some("main"));
            assert_eq!(metrics[0].label(labels::PID), Some("101"));
            assert_eq!(metrics[0].label(labels::PORT), Some("1560"));
        }
        assert_eq!(grouped[MetricCategory::Memory.index()][0].value, 100.0);
        assert_eq!(grouped[MetricCategory::Connections.index()][0].value, 5.0);
        assert_eq!(grouped[MetricCategory::AvgDbCallTime.index()][0].value, 0.125);
    }

    #[test]
    fn test_processes_keep_record_order() {
        let cluster = ClusterInfo::new("c-1", "main");
        let mut grouped = Grouped::default();
        push_process(&mut grouped, &cluster, &process("101", 1560, 100, 5));
        push_process(&mut grouped, &cluster, &process("102", 1561, 200, 9));

        let memory: Vec<f64> = grouped[MetricCategory::Memory.index()]
            .iter()
            .map(|m| m.value)
            .collect();
        assert_eq!(memory, vec![100.0, 200.0]);
    }

    #[test]
    fn test_non_finite_values_are_left_out() {
        let cluster = ClusterInfo::new("c-1", "main");
        let mut grouped = Grouped::default();
        let mut bad = process("101", 1560, 100, 5);
        bad.avg_call_time = f64::NAN;
        bad.avg_threads = f64::NEG_INFINITY;

        let malformed = push_process(&mut grouped, &cluster, &bad);
        assert_eq!(
            malformed,
            vec![MetricCategory::AvgThreads, MetricCategory::AvgCallTime]
        );
        assert!(grouped[MetricCategory::AvgThreads.index()].is_empty());
        assert!(grouped[MetricCategory::AvgCallTime.index()].is_empty());
        assert_eq!(grouped[MetricCategory::Connections.index()].len(), 1);
    }

    #[test]
    fn test_negative_values_are_delivered() {
        let cluster = ClusterInfo::new("c-1", "main");
        let mut grouped = Grouped::default();
        let mut record = process("101", 1560, -1, 5);
        record.avg_db_call_time = -0.5;

        let malformed = push_process(&mut grouped, &cluster, &record);
        assert!(malformed.is_empty());
        assert_eq!(grouped[MetricCategory::Memory.index()][0].value, -1.0);
        assert_eq!(grouped[MetricCategory::AvgDbCallTime.index()][0].value, -0.5);
    }
}
