//! Metric model shared by the RAS telemetry collector and its consumers.
//!
//! A poll tick produces one [`MetricBatch`] per [`MetricCategory`]; each batch
//! carries the [`Metric`] values of every process observed in that tick.
//! [`Counter`] and [`Gauge`] are used by the collector to observe itself.

pub mod category;
pub mod metric;
pub mod metrics;

pub use category::{MetricCategory, UnknownCategory};
pub use metric::{labels, Metric, MetricBatch};
pub use metrics::{Counter, Gauge};
