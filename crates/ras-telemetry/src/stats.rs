use ras_monitor::{Counter, Gauge};
use serde::Serialize;

/// Self-observation of the poll loop.
#[derive(Default)]
pub(crate) struct CollectorStats {
    pub ticks: Counter,
    pub idle_skips: Counter,
    pub panicked_ticks: Counter,
    pub cluster_failures: Counter,
    pub malformed_values: Counter,
    pub batches_delivered: Counter,
    pub batches_dropped: Counter,
    pub subscribers: Gauge,
}

impl CollectorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CollectorStatsSnapshot {
        CollectorStatsSnapshot {
            ticks: self.ticks.get(),
            idle_skips: self.idle_skips.get(),
            panicked_ticks: self.panicked_ticks.get(),
            cluster_failures: self.cluster_failures.get(),
            malformed_values: self.malformed_values.get(),
            batches_delivered: self.batches_delivered.get(),
            batches_dropped: self.batches_dropped.get(),
            subscribers: self.subscribers.get().max(0) as u64,
        }
    }
}

/// Point-in-time copy of the collector's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectorStatsSnapshot {
    pub ticks: u64,
    pub idle_skips: u64,
    pub panicked_ticks: u64,
    pub cluster_failures: u64,
    pub malformed_values: u64,
    pub batches_delivered: u64,
    pub batches_dropped: u64,
    pub subscribers: u64,
}
