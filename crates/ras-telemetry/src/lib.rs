//! Telemetry distribution engine for RAS clusters.
//!
//! A single [`Collector`] per process polls the remote administration server
//! on a fixed interval, turns every working process into one metric per
//! [`MetricCategory`](ras_monitor::MetricCategory), and fans each category's
//! batch out to the streams currently subscribed to it.
//!
//! Each subscriber owns a bounded queue. Delivery never waits on a
//! subscriber: when a queue is full that subscriber misses the batch and
//! everyone else still receives it. The poll loop stops when its shutdown
//! signal fires; on the way out it closes every stream and the remote
//! connection, even if the loop task panicked.

pub mod collector;
pub mod config;
pub mod error;
pub mod normalize;
pub mod registry;
pub mod stats;

pub use collector::{Collector, CollectorCell, LoopState};
pub use config::{CollectorConfig, ConfigError, TelemetryConfig};
pub use error::CollectorError;
pub use registry::{DeliveryOutcome, MetricStream, StreamId, SubscriptionRegistry};
pub use stats::CollectorStatsSnapshot;
