use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of measurement a metric carries.
///
/// The set is closed: every process record yields exactly one value per
/// category on each poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    /// Memory used by the working process.
    Memory,
    /// Number of open connections.
    Connections,
    /// Average number of threads.
    AvgThreads,
    /// Average call time.
    AvgCallTime,
    /// Average selection size.
    SelectionSize,
    /// Average database call time.
    AvgDbCallTime,
    /// Average server call time.
    AvgServerCallTime,
}

impl MetricCategory {
    /// Every category, in declaration order.
    pub const ALL: [MetricCategory; 7] = [
        MetricCategory::Memory,
        MetricCategory::Connections,
        MetricCategory::AvgThreads,
        MetricCategory::AvgCallTime,
        MetricCategory::SelectionSize,
        MetricCategory::AvgDbCallTime,
        MetricCategory::AvgServerCallTime,
    ];

    /// Stable external name, used both as the metric name and as the stream path.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::Memory => "memory",
            MetricCategory::Connections => "connections",
            MetricCategory::AvgThreads => "avg_threads",
            MetricCategory::AvgCallTime => "avg_call_time",
            MetricCategory::SelectionSize => "selection_size",
            MetricCategory::AvgDbCallTime => "avg_db_call_time",
            MetricCategory::AvgServerCallTime => "avg_server_call_time",
        }
    }

    /// Position of the category in [`MetricCategory::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a name does not match any [`MetricCategory`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric category: {0:?}")]
pub struct UnknownCategory(pub String);

impl FromStr for MetricCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_name() {
        for category in MetricCategory::ALL {
            let parsed: MetricCategory = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "cpu".parse::<MetricCategory>().unwrap_err();
        assert_eq!(err, UnknownCategory("cpu".into()));
        assert!("Memory".parse::<MetricCategory>().is_err());
        assert!("".parse::<MetricCategory>().is_err());
    }

    #[test]
    fn test_index_matches_all_order() {
        for (i, category) in MetricCategory::ALL.iter().enumerate() {
            assert_eq!(category.index(), i);
        }
    }

    #[test]
    fn test_serde_uses_external_name() {
        let json = serde_json::to_string(&MetricCategory::AvgDbCallTime).unwrap();
        assert_eq!(json, "\"avg_db_call_time\"");
        let back: MetricCategory = serde_json::from_str("\"selection_size\"").unwrap();
        assert_eq!(back, MetricCategory::SelectionSize);
    }
}
