//! In-memory [`RasSource`] for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ClientError, ClientResult};
use crate::source::{ClusterInfo, ProcessInfo, RasCredentials, RasSource};

type Handler<Req, Rsp> = Arc<dyn Fn(Req) -> ClientResult<Rsp> + Send + Sync>;

/// A configurable mock for [`RasSource`].
///
/// Clusters and their processes are served from memory. Individual calls can
/// be overridden with a closure, and every call is counted so tests can
/// assert on remote traffic.
pub struct MockRasSource {
    clusters: Mutex<Vec<(ClusterInfo, Vec<ProcessInfo>)>>,
    failing_clusters: Mutex<HashSet<String>>,
    fail_list_clusters: AtomicBool,
    authenticate_handler: Mutex<Option<Handler<RasCredentials, ()>>>,
    list_processes_handler: Mutex<Option<Handler<ClusterInfo, Vec<ProcessInfo>>>>,
    authenticate_calls: AtomicU64,
    list_clusters_calls: AtomicU64,
    list_processes_calls: AtomicU64,
    close_calls: AtomicU64,
}

impl MockRasSource {
    pub fn new() -> Self {
        Self {
            clusters: Mutex::new(Vec::new()),
            failing_clusters: Mutex::new(HashSet::new()),
            fail_list_clusters: AtomicBool::new(false),
            authenticate_handler: Mutex::new(None),
            list_processes_handler: Mutex::new(None),
            authenticate_calls: AtomicU64::new(0),
            list_clusters_calls: AtomicU64::new(0),
            list_processes_calls: AtomicU64::new(0),
            close_calls: AtomicU64::new(0),
        }
    }

    /// Wrap in an `Arc` for convenient sharing.
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Register a cluster together with the processes it reports.
    pub fn add_cluster(&self, cluster: ClusterInfo, processes: Vec<ProcessInfo>) {
        self.clusters.lock().push((cluster, processes));
    }

    /// Make `list_processes` fail for the given cluster.
    pub fn fail_cluster(&self, cluster_uuid: impl Into<String>) {
        self.failing_clusters.lock().insert(cluster_uuid.into());
    }

    /// Make `list_clusters` fail.
    pub fn fail_list_clusters(&self, fail: bool) {
        self.fail_list_clusters.store(fail, Ordering::Relaxed);
    }

    pub fn on_authenticate(
        &self,
        f: impl Fn(RasCredentials) -> ClientResult<()> + Send + Sync + 'static,
    ) {
        *self.authenticate_handler.lock() = Some(Arc::new(f));
    }

    pub fn on_list_processes(
        &self,
        f: impl Fn(ClusterInfo) -> ClientResult<Vec<ProcessInfo>> + Send + Sync + 'static,
    ) {
        *self.list_processes_handler.lock() = Some(Arc::new(f));
    }

    pub fn authenticate_calls(&self) -> u64 {
        self.authenticate_calls.load(Ordering::SeqCst)
    }

    pub fn list_clusters_calls(&self) -> u64 {
        self.list_clusters_calls.load(Ordering::SeqCst)
    }

    pub fn list_processes_calls(&self) -> u64 {
        self.list_processes_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u64 {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockRasSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RasSource for MockRasSource {
    async fn authenticate(&self, credentials: &RasCredentials) -> ClientResult<()> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        let handler = self.authenticate_handler.lock().clone();
        match handler {
            Some(f) => f(credentials.clone()),
            None => Ok(()),
        }
    }

    async fn list_clusters(&self) -> ClientResult<Vec<ClusterInfo>> {
        self.list_clusters_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_clusters.load(Ordering::Relaxed) {
            return Err(ClientError::Connection("cluster listing unavailable".into()));
        }
        Ok(self.clusters.lock().iter().map(|(c, _)| c.clone()).collect())
    }

    async fn list_processes(&self, cluster: &ClusterInfo) -> ClientResult<Vec<ProcessInfo>> {
        self.list_processes_calls.fetch_add(1, Ordering::SeqCst);
        let handler = self.list_processes_handler.lock().clone();
        if let Some(f) = handler {
            return f(cluster.clone());
        }
        if self.failing_clusters.lock().contains(&cluster.uuid) {
            return Err(ClientError::Connection(format!(
                "cluster {} did not respond",
                cluster.name
            )));
        }
        self.clusters
            .lock()
            .iter()
            .find(|(c, _)| c.uuid == cluster.uuid)
            .map(|(_, procs)| procs.clone())
            .ok_or_else(|| ClientError::ClusterNotFound(cluster.uuid.clone()))
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}
