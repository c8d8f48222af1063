//! Replays cluster telemetry from a JSON snapshot on disk.
//!
//! The file is re-read on every call, so editing it while the collector runs
//! changes what the next tick observes. Expected layout:
//!
//! ```json
//! { "clusters": [ { "uuid": "...", "name": "main", "processes": [ { "pid": "101", ... } ] } ] }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{ClientError, ClientResult};
use crate::source::{ClusterInfo, ProcessInfo, RasCredentials, RasSource};

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(default)]
    clusters: Vec<SnapshotCluster>,
}

#[derive(Debug, Deserialize)]
struct SnapshotCluster {
    #[serde(flatten)]
    info: ClusterInfo,
    #[serde(default)]
    processes: Vec<ProcessInfo>,
}

pub struct SnapshotFileSource {
    path: PathBuf,
    closed: AtomicBool,
}

impl SnapshotFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> ClientResult<Snapshot> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ClientError::Snapshot {
                path: self.path.clone(),
                source,
            })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl RasSource for SnapshotFileSource {
    async fn authenticate(&self, credentials: &RasCredentials) -> ClientResult<()> {
        // Snapshots carry no credentials; a readable file is all that is required.
        self.read().await?;
        tracing::debug!(path = %self.path.display(), user = %credentials.user, "snapshot source ready");
        Ok(())
    }

    async fn list_clusters(&self) -> ClientResult<Vec<ClusterInfo>> {
        let snapshot = self.read().await?;
        Ok(snapshot.clusters.into_iter().map(|c| c.info).collect())
    }

    async fn list_processes(&self, cluster: &ClusterInfo) -> ClientResult<Vec<ProcessInfo>> {
        let snapshot = self.read().await?;
        snapshot
            .clusters
            .into_iter()
            .find(|c| c.info.uuid == cluster.uuid)
            .map(|c| c.processes)
            .ok_or_else(|| ClientError::ClusterNotFound(cluster.uuid.clone()))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
