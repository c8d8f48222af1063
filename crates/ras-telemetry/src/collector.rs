//! The poll loop and its lifecycle.
//!
//! `Collector::start` authenticates, then spawns two tasks: the poll loop,
//! and a supervisor that awaits it and always runs the shutdown path (close
//! every stream, close the remote connection) however the loop ended.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ras_client::{ClientError, ClientResult, ClusterInfo, RasCredentials, RasSource};
use ras_monitor::{MetricBatch, MetricCategory};
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::CollectorConfig;
use crate::error::CollectorError;
use crate::normalize::{self, Grouped};
use crate::registry::{DeliveryOutcome, MetricStream, StreamId, SubscriptionRegistry};
use crate::stats::{CollectorStats, CollectorStatsSnapshot};

static INSTANCE: CollectorCell = CollectorCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Running => f.write_str("running"),
            LoopState::Stopped => f.write_str("stopped"),
        }
    }
}

/// Polls one remote administration server and distributes its telemetry.
pub struct Collector {
    source: Arc<dyn RasSource>,
    config: CollectorConfig,
    registry: SubscriptionRegistry,
    stats: CollectorStats,
    disposed: AtomicBool,
    state: watch::Sender<LoopState>,
}

impl Collector {
    /// Authenticate against `source` and start polling until `shutdown`
    /// turns `true` or its sender is dropped.
    ///
    /// Prefer [`CollectorCell::get_or_start`] so that a process never runs
    /// two pollers against the same server.
    pub async fn start(
        source: Arc<dyn RasSource>,
        credentials: &RasCredentials,
        config: CollectorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Arc<Self>, CollectorError> {
        if let Err(e) = with_timeout(config.rpc_timeout, source.authenticate(credentials)).await {
            source.close().await;
            return Err(CollectorError::Authentication(e));
        }

        let (state, _) = watch::channel(LoopState::Running);
        let collector = Arc::new(Self {
            source,
            registry: SubscriptionRegistry::new(config.stream_buffer),
            config,
            stats: CollectorStats::new(),
            disposed: AtomicBool::new(false),
            state,
        });
        collector.spawn(shutdown);

        tracing::info!(
            user = %credentials.user,
            poll_interval = ?collector.config.poll_interval,
            stream_buffer = collector.config.stream_buffer,
            "telemetry collector started"
        );
        Ok(collector)
    }

    /// The process-wide collector.
    ///
    /// The first successful call starts it; every later call returns the
    /// same instance and ignores its arguments.
    pub async fn get_instance(
        shutdown: watch::Receiver<bool>,
        source: Arc<dyn RasSource>,
        credentials: &RasCredentials,
        config: CollectorConfig,
    ) -> Result<Arc<Self>, CollectorError> {
        INSTANCE
            .get_or_start(shutdown, source, credentials, config)
            .await
    }

    /// Open a stream of batches for `category`.
    pub fn subscribe_stream(&self, category: MetricCategory) -> MetricStream {
        let stream = self.registry.subscribe(category);
        self.update_subscribers();
        tracing::debug!(stream = %stream.id(), %category, "stream subscribed");
        stream
    }

    /// Stop delivering to `stream` and close it. Idempotent.
    pub fn describe_stream(&self, stream: &mut MetricStream) {
        if self.registry.unsubscribe(stream) {
            tracing::debug!(stream = %stream.id(), category = %stream.category(), "stream released");
        }
        self.update_subscribers();
    }

    /// Stop delivering to the stream with `id` when its handle is out of
    /// reach. The stream ends once its queued batches are read.
    pub fn release(&self, id: StreamId) -> bool {
        let removed = self.registry.remove(id);
        self.update_subscribers();
        removed
    }

    /// Close the remote connection. Only the first call has an effect.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.source.close().await;
        tracing::info!("remote connection closed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// Resolve once the poll loop has stopped and cleaned up.
    pub async fn wait_stopped(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == LoopState::Stopped).await;
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn stats(&self) -> CollectorStatsSnapshot {
        self.stats.snapshot()
    }

    /// Human-readable summary of subscriptions and loop counters.
    pub fn info(&self) -> String {
        let subscriptions = self
            .registry
            .counts_by_category()
            .iter()
            .map(|(category, count)| format!("{}={}", category, count))
            .collect::<Vec<_>>()
            .join(", ");
        let stats = self.stats();
        format!(
            "state={} subscriptions={} [{}] ticks={} idle_skips={} cluster_failures={} \
             malformed_values={} delivered={} dropped={}",
            self.state(),
            self.registry.len(),
            subscriptions,
            stats.ticks,
            stats.idle_skips,
            stats.cluster_failures,
            stats.malformed_values,
            stats.batches_delivered,
            stats.batches_dropped,
        )
    }

    fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) {
        let poller = tokio::spawn(Arc::clone(self).run(shutdown));
        let collector = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = poller.await {
                tracing::error!(error = %e, "poll loop terminated abnormally");
            }
            collector.finish().await;
        });
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow_and_update() {
            return;
        }

        let clusters: Arc<[ClusterInfo]> =
            match with_timeout(self.config.rpc_timeout, self.source.list_clusters()).await {
                Ok(clusters) => {
                    tracing::info!(clusters = clusters.len(), "cluster list fetched");
                    clusters.into()
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to list clusters, polling without them");
                    Arc::from(Vec::new())
                }
            };

        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        tracing::info!("shutdown signal received, stopping poll loop");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let tick = tokio::spawn(Arc::clone(&self).poll_once(Arc::clone(&clusters)));
                    if !self.finish_tick(tick, &mut shutdown).await {
                        break;
                    }
                }
            }
        }
    }

    /// Wait for a tick while still honouring shutdown. Returns `false` when
    /// shutdown fired; the tick is aborted in that case.
    async fn finish_tick(
        &self,
        mut tick: JoinHandle<()>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        tick.abort();
                        tracing::info!("shutdown signal received mid-tick, tick aborted");
                        return false;
                    }
                }
                joined = &mut tick => {
                    if let Err(e) = joined {
                        self.stats.panicked_ticks.increment();
                        tracing::error!(error = %e, "poll tick aborted, skipping");
                    }
                    return true;
                }
            }
        }
    }

    async fn poll_once(self: Arc<Self>, clusters: Arc<[ClusterInfo]>) {
        self.stats.ticks.increment();
        if self.registry.is_empty() {
            self.stats.idle_skips.increment();
            return;
        }
        if self.is_disposed() {
            return;
        }

        let timestamp = Utc::now();
        let mut grouped = Grouped::default();

        for cluster in clusters.iter() {
            let processes =
                match with_timeout(self.config.rpc_timeout, self.source.list_processes(cluster))
                    .await
                {
                    Ok(processes) => processes,
                    Err(e) => {
                        self.stats.cluster_failures.increment();
                        tracing::warn!(
                            cluster = %cluster.name,
                            error = %e,
                            "failed to list working processes, cluster left out of this tick"
                        );
                        continue;
                    }
                };

            for process in &processes {
                let malformed = normalize::push_process(&mut grouped, cluster, process);
                if !malformed.is_empty() {
                    self.stats.malformed_values.add(malformed.len() as u64);
                    tracing::debug!(
                        cluster = %cluster.name,
                        pid = %process.pid,
                        ?malformed,
                        "process reported malformed values"
                    );
                }
            }
        }

        let batches: Vec<MetricBatch> = MetricCategory::ALL
            .into_iter()
            .zip(grouped)
            .map(|(category, metrics)| MetricBatch::new(category, timestamp, metrics))
            .collect();
        self.deliver(&batches);
    }

    /// Hand every subscriber its category's batch without waiting on anyone.
    fn deliver(&self, batches: &[MetricBatch]) {
        for delivery in self.registry.snapshot_for_delivery() {
            let batch = batches[delivery.category.index()].clone();
            match delivery.try_deliver(batch) {
                DeliveryOutcome::Delivered => self.stats.batches_delivered.increment(),
                DeliveryOutcome::Full => {
                    self.stats.batches_dropped.increment();
                    tracing::debug!(
                        stream = %delivery.id,
                        category = %delivery.category,
                        "subscriber is not draining its stream, batch dropped"
                    );
                }
                DeliveryOutcome::Closed => {
                    if self.registry.remove(delivery.id) {
                        tracing::debug!(stream = %delivery.id, "stream dropped by subscriber, released");
                    }
                }
            }
        }
        self.update_subscribers();
    }

    async fn finish(&self) {
        let closed = self.registry.close_all();
        self.update_subscribers();
        self.dispose().await;
        self.state.send_replace(LoopState::Stopped);
        tracing::info!(closed_streams = closed, "telemetry collector stopped");
    }

    fn update_subscribers(&self) {
        self.stats.subscribers.set(self.registry.len() as i64);
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    call: impl Future<Output = ClientResult<T>>,
) -> ClientResult<T> {
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(ClientError::Timeout(timeout)))
}

/// Starts at most one [`Collector`] and hands out that same instance to
/// every caller.
pub struct CollectorCell {
    cell: OnceCell<Arc<Collector>>,
}

impl CollectorCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    /// Return the collector, starting it on the first call.
    ///
    /// Concurrent first calls wait for a single start. A failed start leaves
    /// the cell empty so that a later call can try again.
    pub async fn get_or_start(
        &self,
        shutdown: watch::Receiver<bool>,
        source: Arc<dyn RasSource>,
        credentials: &RasCredentials,
        config: CollectorConfig,
    ) -> Result<Arc<Collector>, CollectorError> {
        self.cell
            .get_or_try_init(|| Collector::start(source, credentials, config, shutdown))
            .await
            .map(Arc::clone)
    }

    pub fn get(&self) -> Option<Arc<Collector>> {
        self.cell.get().cloned()
    }
}

impl Default for CollectorCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ras_client::{MockRasSource, ProcessInfo};
    use ras_monitor::labels;
    use std::sync::atomic::AtomicU64;

    fn fast_config() -> CollectorConfig {
        CollectorConfig {
            poll_interval: Duration::from_millis(10),
            rpc_timeout: Duration::from_secs(1),
            stream_buffer: 16,
        }
    }

    fn admin() -> RasCredentials {
        RasCredentials::new("admin", "admin")
    }

    fn process(pid: &str, port: u16, memory: i64, connections: i64) -> ProcessInfo {
        ProcessInfo {
            memory_size: memory,
            connections,
            ..ProcessInfo::new(pid, port)
        }
    }

    fn two_process_source() -> Arc<MockRasSource> {
        let mock = MockRasSource::new().into_arc();
        mock.add_cluster(
            ClusterInfo::new("c-1", "main"),
            vec![process("101", 1560, 100, 5), process("102", 1561, 200, 9)],
        );
        mock
    }

    async fn start(
        mock: &Arc<MockRasSource>,
        config: CollectorConfig,
    ) -> (Arc<Collector>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let collector = Collector::start(mock.clone(), &admin(), config, rx)
            .await
            .unwrap();
        (collector, tx)
    }

    async fn next_batch(stream: &mut MetricStream) -> MetricBatch {
        tokio::time::timeout(Duration::from_secs(2), stream.recv())
            .await
            .expect("no batch within 2s")
            .expect("stream ended")
    }

    #[tokio::test]
    async fn test_fans_out_by_category() {
        let mock = two_process_source();
        let (collector, _tx) = start(&mock, fast_config()).await;

        let mut memory = collector.subscribe_stream(MetricCategory::Memory);
        let mut connections = collector.subscribe_stream(MetricCategory::Connections);

        let mem = next_batch(&mut memory).await;
        let conn = next_batch(&mut connections).await;

        assert_eq!(mem.category, MetricCategory::Memory);
        assert_eq!(mem.values().collect::<Vec<_>>(), vec![100.0, 200.0]);
        assert_eq!(conn.category, MetricCategory::Connections);
        assert_eq!(conn.values().collect::<Vec<_>>(), vec![5.0, 9.0]);
        assert_eq!(mem.timestamp, conn.timestamp);

        for (m, c) in mem.metrics.iter().zip(conn.metrics.iter()) {
            assert_eq!(m.labels, c.labels);
            assert_eq!(m.label(labels::CLUSTER), Some("main"));
        }
        assert_eq!(mem.metrics[0].label(labels::PID), Some("101"));
        assert_eq!(mem.metrics[0].label(labels::PORT), Some("1560"));
        assert_eq!(mem.metrics[1].label(labels::PID), Some("102"));
        assert_eq!(mem.metrics[1].label(labels::PORT), Some("1561"));
    }

    #[tokio::test]
    async fn test_streams_only_see_their_category() {
        let mock = two_process_source();
        let (collector, _tx) = start(&mock, fast_config()).await;

        let mut streams: Vec<MetricStream> = MetricCategory::ALL
            .into_iter()
            .map(|c| collector.subscribe_stream(c))
            .collect();

        for stream in streams.iter_mut() {
            for _ in 0..2 {
                let batch = next_batch(stream).await;
                assert_eq!(batch.category, stream.category());
                assert_eq!(batch.len(), 2);
                assert!(batch
                    .metrics
                    .iter()
                    .all(|m| m.name == stream.category().as_str()));
            }
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_before_tick_delivers_nothing() {
        let mock = two_process_source();
        let (collector, _tx) = start(&mock, fast_config()).await;

        let mut stream = collector.subscribe_stream(MetricCategory::Memory);
        collector.describe_stream(&mut stream);
        collector.describe_stream(&mut stream);

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(stream.recv().await.is_none());
        assert!(stream.recv().await.is_none());
        let stats = collector.stats();
        assert!(stats.ticks > 0);
        assert_eq!(stats.batches_delivered, 0);
        assert_eq!(collector.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_idle_ticks_make_no_remote_calls() {
        let mock = two_process_source();
        let (collector, _tx) = start(&mock, fast_config()).await;

        tokio::time::sleep(Duration::from_millis(60)).await;

        let stats = collector.stats();
        assert!(stats.ticks > 0);
        assert_eq!(stats.idle_skips, stats.ticks);
        assert_eq!(mock.list_clusters_calls(), 1);
        assert_eq!(mock.list_processes_calls(), 0);
    }

    #[tokio::test]
    async fn test_failing_cluster_is_left_out() {
        let mock = MockRasSource::new().into_arc();
        mock.add_cluster(ClusterInfo::new("c-1", "main"), vec![process("101", 1560, 100, 5)]);
        mock.add_cluster(
            ClusterInfo::new("c-2", "reserve"),
            vec![process("201", 1660, 300, 1)],
        );
        mock.fail_cluster("c-1");
        let (collector, _tx) = start(&mock, fast_config()).await;

        let mut stream = collector.subscribe_stream(MetricCategory::Memory);
        for _ in 0..2 {
            let batch = next_batch(&mut stream).await;
            assert_eq!(batch.values().collect::<Vec<_>>(), vec![300.0]);
            assert_eq!(batch.metrics[0].label(labels::CLUSTER), Some("reserve"));
        }
        assert!(collector.stats().cluster_failures >= 2);
        assert!(collector.is_running());
    }

    #[tokio::test]
    async fn test_cluster_list_failure_is_not_fatal() {
        let mock = two_process_source();
        mock.fail_list_clusters(true);
        let (collector, _tx) = start(&mock, fast_config()).await;

        let mut stream = collector.subscribe_stream(MetricCategory::Memory);
        let batch = next_batch(&mut stream).await;
        assert!(batch.is_empty());
        assert!(collector.is_running());
    }

    #[tokio::test]
    async fn test_malformed_values_are_skipped() {
        let mock = MockRasSource::new().into_arc();
        let mut bad = process("101", 1560, 100, 5);
        bad.avg_threads = f64::INFINITY;
        mock.add_cluster(ClusterInfo::new("c-1", "main"), vec![bad]);
        let (collector, _tx) = start(&mock, fast_config()).await;

        let mut threads = collector.subscribe_stream(MetricCategory::AvgThreads);
        let mut memory = collector.subscribe_stream(MetricCategory::Memory);

        assert!(next_batch(&mut threads).await.is_empty());
        assert_eq!(next_batch(&mut memory).await.len(), 1);
        assert!(collector.stats().malformed_values >= 1);
    }

    #[tokio::test]
    async fn test_negative_values_are_delivered() {
        let mock = MockRasSource::new().into_arc();
        mock.add_cluster(ClusterInfo::new("c-1", "main"), vec![process("101", 1560, -1, 5)]);
        let (collector, _tx) = start(&mock, fast_config()).await;

        let mut memory = collector.subscribe_stream(MetricCategory::Memory);
        let batch = next_batch(&mut memory).await;
        assert_eq!(batch.values().collect::<Vec<_>>(), vec![-1.0]);
        assert_eq!(collector.stats().malformed_values, 0);
    }

    /// Answers every process listing only after `delay`.
    struct SlowSource {
        delay: Duration,
        clusters: Vec<ClusterInfo>,
        list_processes_calls: AtomicU64,
        close_calls: AtomicU64,
    }

    #[async_trait]
    impl RasSource for SlowSource {
        async fn authenticate(&self, _credentials: &RasCredentials) -> ClientResult<()> {
            Ok(())
        }

        async fn list_clusters(&self) -> ClientResult<Vec<ClusterInfo>> {
            Ok(self.clusters.clone())
        }

        async fn list_processes(&self, _cluster: &ClusterInfo) -> ClientResult<Vec<ProcessInfo>> {
            self.list_processes_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(vec![process("101", 1560, 100, 5)])
        }

        async fn close(&self) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_running_tick() {
        let source = Arc::new(SlowSource {
            delay: Duration::from_secs(1),
            clusters: vec![
                ClusterInfo::new("c-1", "main"),
                ClusterInfo::new("c-2", "reserve"),
                ClusterInfo::new("c-3", "archive"),
            ],
            list_processes_calls: AtomicU64::new(0),
            close_calls: AtomicU64::new(0),
        });
        let (tx, rx) = watch::channel(false);
        let collector = Collector::start(source.clone(), &admin(), fast_config(), rx)
            .await
            .unwrap();

        let mut stream = collector.subscribe_stream(MetricCategory::Memory);
        tokio::time::timeout(Duration::from_secs(2), async {
            while source.list_processes_calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let started = Instant::now();
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), collector.wait_stopped())
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(source.close_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.list_processes_calls.load(Ordering::SeqCst), 1);
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_stall_others() {
        let mock = two_process_source();
        let config = CollectorConfig {
            stream_buffer: 1,
            ..fast_config()
        };
        let (collector, _tx) = start(&mock, config).await;

        let mut slow = collector.subscribe_stream(MetricCategory::Memory);
        let mut fast = collector.subscribe_stream(MetricCategory::Memory);

        for _ in 0..3 {
            next_batch(&mut fast).await;
        }

        assert!(collector.stats().batches_dropped >= 1);
        assert!(slow.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_dropped_stream_is_released() {
        let mock = two_process_source();
        let (collector, _tx) = start(&mock, fast_config()).await;

        let stream = collector.subscribe_stream(MetricCategory::Memory);
        assert_eq!(collector.subscriber_count(), 1);
        drop(stream);

        let released = tokio::time::timeout(Duration::from_secs(2), async {
            while collector.subscriber_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(released.is_ok());
    }

    #[tokio::test]
    async fn test_release_by_id_ends_stream() {
        let mock = two_process_source();
        let (collector, _tx) = start(&mock, fast_config()).await;

        let mut stream = collector.subscribe_stream(MetricCategory::Memory);
        assert!(collector.release(stream.id()));
        assert!(!collector.release(stream.id()));

        let ended = tokio::time::timeout(Duration::from_secs(2), async {
            while stream.recv().await.is_some() {}
        })
        .await;
        assert!(ended.is_ok());
        assert_eq!(collector.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_tick_is_skipped() {
        let mock = MockRasSource::new().into_arc();
        mock.add_cluster(ClusterInfo::new("c-1", "main"), vec![]);
        let panicked = Arc::new(AtomicBool::new(false));
        let flag = panicked.clone();
        mock.on_list_processes(move |_| {
            if !flag.swap(true, Ordering::SeqCst) {
                panic!("garbled process record");
            }
            Ok(vec![process("7", 1600, 42, 1)])
        });
        let (collector, _tx) = start(&mock, fast_config()).await;

        let mut stream = collector.subscribe_stream(MetricCategory::Memory);
        let batch = next_batch(&mut stream).await;

        assert_eq!(batch.values().collect::<Vec<_>>(), vec![42.0]);
        assert!(panicked.load(Ordering::SeqCst));
        assert_eq!(collector.stats().panicked_ticks, 1);
        assert!(collector.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything_once() {
        let mock = two_process_source();
        let (collector, tx) = start(&mock, fast_config()).await;

        let mut stream = collector.subscribe_stream(MetricCategory::Memory);
        next_batch(&mut stream).await;

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), collector.wait_stopped())
            .await
            .unwrap();

        assert_eq!(collector.state(), LoopState::Stopped);
        assert_eq!(mock.close_calls(), 1);
        assert_eq!(collector.subscriber_count(), 0);

        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while stream.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());

        let ticks = collector.stats().ticks;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(collector.stats().ticks, ticks);

        collector.dispose().await;
        assert_eq!(mock.close_calls(), 1);

        let mut late = collector.subscribe_stream(MetricCategory::Memory);
        assert!(late.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_loop() {
        let mock = two_process_source();
        let (collector, tx) = start(&mock, fast_config()).await;
        drop(tx);

        tokio::time::timeout(Duration::from_secs(2), collector.wait_stopped())
            .await
            .unwrap();
        assert_eq!(mock.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let mock = two_process_source();
        let (collector, _tx) = start(&mock, fast_config()).await;

        collector.dispose().await;
        collector.dispose().await;
        assert!(collector.is_disposed());
        assert_eq!(mock.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_cell_starts_once() {
        let cell = CollectorCell::new();
        let (_tx, rx) = watch::channel(false);
        let first_source = two_process_source();
        let second_source = two_process_source();
        let admin = admin();
        let other = RasCredentials::new("other", "other");

        let (a, b) = tokio::join!(
            cell.get_or_start(rx.clone(), first_source.clone(), &admin, fast_config()),
            cell.get_or_start(
                rx.clone(),
                second_source.clone(),
                &other,
                CollectorConfig::default(),
            ),
        );
        let a = a.unwrap();
        let b = b.unwrap();
        let c = cell
            .get_or_start(rx, second_source.clone(), &admin, fast_config())
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(
            first_source.authenticate_calls() + second_source.authenticate_calls(),
            1
        );
        assert!(Arc::ptr_eq(&cell.get().unwrap(), &a));
    }

    #[tokio::test]
    async fn test_cell_authentication_failure_can_be_retried() {
        let cell = CollectorCell::new();
        let (_tx, rx) = watch::channel(false);

        let rejecting = MockRasSource::new().into_arc();
        rejecting.on_authenticate(|_| Err(ClientError::Authentication("bad password".into())));
        let err = cell
            .get_or_start(rx.clone(), rejecting.clone(), &admin(), fast_config())
            .await
            .err()
            .expect("authentication must fail");
        assert!(matches!(err, CollectorError::Authentication(_)));
        assert!(cell.get().is_none());
        assert_eq!(rejecting.close_calls(), 1);
        assert_eq!(rejecting.list_clusters_calls(), 0);

        let accepting = two_process_source();
        let collector = cell
            .get_or_start(rx, accepting.clone(), &admin(), fast_config())
            .await
            .unwrap();
        assert!(collector.is_running());
        assert_eq!(accepting.authenticate_calls(), 1);
    }

    #[tokio::test]
    async fn test_process_wide_instance() {
        let (_tx, rx) = watch::channel(false);
        let a = Collector::get_instance(rx.clone(), two_process_source(), &admin(), fast_config())
            .await
            .unwrap();
        let b = Collector::get_instance(
            rx,
            MockRasSource::new().into_arc(),
            &RasCredentials::new("someone", "else"),
            CollectorConfig::default(),
        )
        .await
        .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_info_lists_subscriptions() {
        let mock = two_process_source();
        let (collector, _tx) = start(&mock, fast_config()).await;

        let _a = collector.subscribe_stream(MetricCategory::Memory);
        let _b = collector.subscribe_stream(MetricCategory::Memory);
        let _c = collector.subscribe_stream(MetricCategory::Connections);

        let info = collector.info();
        assert!(info.contains("state=running"));
        assert!(info.contains("subscriptions=3"));
        assert!(info.contains("memory=2"));
        assert!(info.contains("connections=1"));
        assert_eq!(collector.stats().subscribers, 3);
    }
}
