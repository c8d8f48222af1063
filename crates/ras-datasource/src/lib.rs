//! Request/response adapter in front of the telemetry collector.
//!
//! Dashboards address telemetry by stream path (`memory`, `connections`, ...).
//! [`Datasource`] maps those paths onto collector subscriptions, shares one
//! subscription per path, and renders every batch as a columnar [`Frame`].

pub mod datasource;
pub mod frame;
pub mod sender;

pub use datasource::{
    Datasource, DatasourceError, HealthCheckResult, HealthStatus, PublishStatus, QueryResponse,
    SubscribeStatus,
};
pub use frame::{Field, FieldValues, Frame, FrameMeta};
pub use sender::{InMemorySender, JsonLinesSender, StreamSender};
