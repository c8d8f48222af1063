//! Stream-path routing on top of a [`Collector`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use ras_monitor::MetricCategory;
use ras_telemetry::{Collector, MetricStream, StreamId};
use tokio::sync::watch;

use crate::frame::{Frame, FRAME_NAME};
use crate::sender::StreamSender;

#[derive(Debug, thiserror::Error)]
pub enum DatasourceError {
    #[error("stream {0:?} has not been subscribed")]
    NotSubscribed(String),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write frame: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to send frame: {0}")]
    Send(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeStatus {
    Ok,
    PermissionDenied,
}

/// Telemetry streams are read-only, so publishing is never granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    PermissionDenied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub frames: Vec<Frame>,
}

struct PathStream {
    id: StreamId,
    stream: Arc<tokio::sync::Mutex<MetricStream>>,
}

/// Serves collector telemetry by stream path.
///
/// Every path holds at most one collector subscription, shared by whoever
/// runs that path.
pub struct Datasource {
    collector: Arc<Collector>,
    uid: String,
    streams: Mutex<HashMap<String, PathStream>>,
}

impl Datasource {
    pub fn new(collector: Arc<Collector>, uid: impl Into<String>) -> Self {
        Self {
            collector,
            uid: uid.into(),
            streams: Mutex::new(HashMap::new()),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Live channel address of `path` for this datasource.
    pub fn channel(&self, path: &str) -> String {
        format!("ds/{}/{}", self.uid, path)
    }

    /// Point the caller at the live channel for `path`.
    ///
    /// The response carries no data; values only flow through
    /// [`run_stream`](Self::run_stream).
    pub fn query(&self, path: &str) -> QueryResponse {
        tracing::debug!(path, "query");
        QueryResponse {
            frames: vec![Frame::new(FRAME_NAME).with_channel(self.channel(path))],
        }
    }

    pub fn subscribe_stream(&self, path: &str) -> SubscribeStatus {
        let category: MetricCategory = match path.parse() {
            Ok(category) => category,
            Err(e) => {
                tracing::warn!(path, error = %e, "stream subscription denied");
                return SubscribeStatus::PermissionDenied;
            }
        };

        self.streams
            .lock()
            .entry(path.to_string())
            .or_insert_with(|| {
                let stream = self.collector.subscribe_stream(category);
                tracing::info!(path, stream = %stream.id(), "stream subscribed");
                PathStream {
                    id: stream.id(),
                    stream: Arc::new(tokio::sync::Mutex::new(stream)),
                }
            });
        SubscribeStatus::Ok
    }

    /// Forward every batch of `path` to `sender` until `shutdown` fires or
    /// the stream ends, then release the path's subscription.
    ///
    /// A frame that cannot be sent is logged and skipped.
    pub async fn run_stream(
        &self,
        path: &str,
        mut shutdown: watch::Receiver<bool>,
        sender: &dyn StreamSender,
    ) -> Result<(), DatasourceError> {
        let handle = self
            .streams
            .lock()
            .get(path)
            .map(|entry| Arc::clone(&entry.stream))
            .ok_or_else(|| DatasourceError::NotSubscribed(path.to_string()))?;
        let mut stream = handle.lock().await;
        let channel = self.channel(path);
        tracing::info!(path, "stream running");

        if !*shutdown.borrow_and_update() {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow_and_update() {
                            break;
                        }
                    }
                    batch = stream.recv() => {
                        let Some(batch) = batch else {
                            break;
                        };
                        let frame = Frame::from_batch(&batch).with_channel(&channel);
                        if let Err(e) = sender.send_frame(&frame).await {
                            tracing::error!(path, error = %e, "failed to send frame");
                        }
                    }
                }
            }
        }

        self.forget(path, &handle);
        self.collector.describe_stream(&mut stream);
        tracing::info!(path, info = %self.collector.info(), "stream stopped");
        Ok(())
    }

    /// Clients may not write to telemetry streams.
    pub fn publish_stream(&self, path: &str) -> PublishStatus {
        tracing::debug!(path, "publish denied");
        PublishStatus::PermissionDenied
    }

    pub fn check_health(&self) -> HealthCheckResult {
        if self.collector.is_running() {
            HealthCheckResult {
                status: HealthStatus::Ok,
                message: format!(
                    "collector running, {} subscriptions",
                    self.collector.subscriber_count()
                ),
            }
        } else {
            HealthCheckResult {
                status: HealthStatus::Error,
                message: "collector stopped".to_string(),
            }
        }
    }

    /// Release every path's subscription.
    pub fn dispose(&self) {
        let streams: Vec<(String, PathStream)> = self.streams.lock().drain().collect();
        let released = streams.len();
        for (path, entry) in streams {
            match entry.stream.try_lock() {
                Ok(mut stream) => self.collector.describe_stream(&mut stream),
                // A runner owns the stream; dropping the subscription ends it.
                Err(_) => {
                    self.collector.release(entry.id);
                }
            }
            tracing::debug!(path = %path, "stream released");
        }
        tracing::info!(released, "datasource disposed");
    }

    fn forget(&self, path: &str, handle: &Arc<tokio::sync::Mutex<MetricStream>>) {
        let mut streams = self.streams.lock();
        if streams
            .get(path)
            .is_some_and(|entry| Arc::ptr_eq(&entry.stream, handle))
        {
            streams.remove(path);
        }
    }
}
