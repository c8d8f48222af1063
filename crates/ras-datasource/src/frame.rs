//! Columnar frames sent to dashboards.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ras_monitor::MetricBatch;
use serde::Serialize;

/// Name given to every frame this adapter produces.
pub const FRAME_NAME: &str = "response";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameMeta {
    /// Live channel address, `ds/<uid>/<path>`.
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValues {
    Time(Vec<DateTime<Utc>>),
    Number(Vec<f64>),
}

impl FieldValues {
    pub fn len(&self) -> usize {
        match self {
            FieldValues::Time(v) => v.len(),
            FieldValues::Number(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One column of a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub values: FieldValues,
}

impl Field {
    pub fn time(timestamp: DateTime<Utc>) -> Self {
        Self {
            name: "time".to_string(),
            labels: BTreeMap::new(),
            values: FieldValues::Time(vec![timestamp]),
        }
    }

    pub fn number(
        name: impl Into<String>,
        labels: impl IntoIterator<Item = (String, String)>,
        value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            labels: labels.into_iter().collect(),
            values: FieldValues::Number(vec![value]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<FrameMeta>,
    pub fields: Vec<Field>,
}

impl Frame {
    /// An empty frame.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meta: None,
            fields: Vec::new(),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.meta = Some(FrameMeta {
            channel: channel.into(),
        });
        self
    }

    /// Render a batch as one row: a `time` column followed by one column per
    /// metric, in batch order.
    pub fn from_batch(batch: &MetricBatch) -> Self {
        let mut fields = Vec::with_capacity(batch.len() + 1);
        fields.push(Field::time(batch.timestamp));
        fields.extend(batch.metrics.iter().map(|metric| {
            Field::number(
                metric.name.clone(),
                metric.labels.iter().map(|(k, v)| (k.clone(), v.clone())),
                metric.value,
            )
        }));

        Self {
            name: FRAME_NAME.to_string(),
            meta: None,
            fields,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ras_monitor::{labels, Metric, MetricCategory};

    fn batch() -> MetricBatch {
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        MetricBatch::new(
            MetricCategory::Memory,
            timestamp,
            vec![
                Metric::new(MetricCategory::Memory, 100.0)
                    .with_label(labels::PID, "101")
                    .with_label(labels::PORT, "1560"),
                Metric::new(MetricCategory::Memory, 200.0)
                    .with_label(labels::PID, "102")
                    .with_label(labels::PORT, "1561"),
            ],
        )
    }

    #[test]
    fn test_from_batch_layout() {
        let batch = batch();
        let frame = Frame::from_batch(&batch);

        assert_eq!(frame.name, FRAME_NAME);
        assert_eq!(frame.fields.len(), 3);
        assert_eq!(frame.fields[0].name, "time");
        assert_eq!(frame.fields[0].values, FieldValues::Time(vec![batch.timestamp]));
        assert_eq!(frame.fields[1].name, "memory");
        assert_eq!(frame.fields[1].values, FieldValues::Number(vec![100.0]));
        assert_eq!(frame.fields[1].labels.get(labels::PID).map(String::as_str), Some("101"));
        assert_eq!(frame.fields[2].values, FieldValues::Number(vec![200.0]));
        assert!(frame.fields.iter().all(|f| f.values.len() == 1));
    }

    #[test]
    fn test_empty_batch_has_only_time() {
        let empty = MetricBatch::empty(MetricCategory::Connections, Utc::now());
        let frame = Frame::from_batch(&empty);
        assert_eq!(frame.fields.len(), 1);
        assert_eq!(frame.fields[0].name, "time");
    }

    #[test]
    fn test_json_shape() {
        let frame = Frame::from_batch(&batch());
        let json: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();

        assert_eq!(json["name"], "response");
        assert!(json.get("meta").is_none());
        assert_eq!(json["fields"][0]["name"], "time");
        assert!(json["fields"][0].get("labels").is_none());
        assert_eq!(json["fields"][0]["values"][0], "2024-03-01T12:00:00Z");
        assert_eq!(json["fields"][1]["labels"]["port"], "1560");
        assert_eq!(json["fields"][1]["values"][0], 100.0);
    }

    #[test]
    fn test_channel_meta() {
        let frame = Frame::new(FRAME_NAME).with_channel("ds/abc/memory");
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["meta"]["channel"], "ds/abc/memory");
        assert_eq!(json["fields"].as_array().map(Vec::len), Some(0));
    }
}
