//! The remote data source seen by the telemetry collector.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;

/// Credentials of a cluster administrator.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RasCredentials {
    pub user: String,
    pub password: String,
}

impl RasCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for RasCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A cluster registered on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
}

impl ClusterInfo {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
            host: String::new(),
            port: 0,
        }
    }
}

/// Runtime figures of one working process, as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProcessInfo {
    pub uuid: String,
    pub pid: String,
    pub host: String,
    pub port: u16,
    /// Memory in use, in kilobytes.
    pub memory_size: i64,
    pub connections: i64,
    pub avg_threads: f64,
    pub avg_call_time: f64,
    pub selection_size: i64,
    pub avg_db_call_time: f64,
    pub avg_server_call_time: f64,
}

impl ProcessInfo {
    pub fn new(pid: impl Into<String>, port: u16) -> Self {
        Self {
            pid: pid.into(),
            port,
            ..Default::default()
        }
    }
}

/// Read access to a remote administration server.
///
/// Implementations must be cheap to call concurrently; the collector holds a
/// single instance for its whole lifetime and calls [`RasSource::close`] once
/// when it stops.
#[async_trait]
pub trait RasSource: Send + Sync {
    /// Authenticate the connection as a cluster administrator.
    async fn authenticate(&self, credentials: &RasCredentials) -> ClientResult<()>;

    /// List the clusters known to the server.
    async fn list_clusters(&self) -> ClientResult<Vec<ClusterInfo>>;

    /// List the working processes of one cluster.
    async fn list_processes(&self, cluster: &ClusterInfo) -> ClientResult<Vec<ProcessInfo>>;

    /// Release the connection.
    async fn close(&self);
}

/// Blanket implementation: `Arc<T>` delegates to `T` for any `T: RasSource`.
#[async_trait]
impl<T: RasSource + ?Sized> RasSource for Arc<T> {
    async fn authenticate(&self, credentials: &RasCredentials) -> ClientResult<()> {
        (**self).authenticate(credentials).await
    }
    async fn list_clusters(&self) -> ClientResult<Vec<ClusterInfo>> {
        (**self).list_clusters().await
    }
    async fn list_processes(&self, cluster: &ClusterInfo) -> ClientResult<Vec<ProcessInfo>> {
        (**self).list_processes(cluster).await
    }
    async fn close(&self) {
        (**self).close().await
    }
}
