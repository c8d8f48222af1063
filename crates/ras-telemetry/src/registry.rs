//! Registry of live metric streams.
//!
//! Every subscriber owns a [`MetricStream`]; the registry keeps the sending
//! half together with the category the stream wants. All mutation goes
//! through one mutex that is held only for the map update or copy. Delivery
//! works on a snapshot and never runs under the lock.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use ras_monitor::{MetricBatch, MetricCategory};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// Opaque identity of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The consumer side of a subscription.
///
/// `recv` yields batches in tick order and returns `None` once the stream has
/// been unsubscribed (after any already queued batches) or the collector has
/// stopped.
#[derive(Debug)]
pub struct MetricStream {
    id: StreamId,
    category: MetricCategory,
    receiver: mpsc::Receiver<MetricBatch>,
}

impl MetricStream {
    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn category(&self) -> MetricCategory {
        self.category
    }

    pub async fn recv(&mut self) -> Option<MetricBatch> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<MetricBatch, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Refuse any further batch. Already queued batches stay readable.
    fn close(&mut self) {
        self.receiver.close();
    }
}

/// Result of handing one batch to one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The subscriber has not drained its queue; this batch is dropped for it.
    Full,
    /// The subscriber is gone.
    Closed,
}

/// A copy of one registry entry, used by the fan-out step.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: StreamId,
    pub category: MetricCategory,
    sender: mpsc::Sender<MetricBatch>,
}

impl Delivery {
    pub fn try_deliver(&self, batch: MetricBatch) -> DeliveryOutcome {
        match self.sender.try_send(batch) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(TrySendError::Full(_)) => DeliveryOutcome::Full,
            Err(TrySendError::Closed(_)) => DeliveryOutcome::Closed,
        }
    }
}

struct Subscription {
    category: MetricCategory,
    sender: mpsc::Sender<MetricBatch>,
}

#[derive(Default)]
struct RegistryState {
    entries: BTreeMap<StreamId, Subscription>,
    closed: bool,
}

pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    capacity: usize,
    state: Mutex<RegistryState>,
}

impl SubscriptionRegistry {
    /// `capacity` is the queue length of every stream created by this registry.
    pub fn new(capacity: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Create a stream for `category`. Never blocks.
    ///
    /// Once the registry is closed the returned stream is already at its end.
    pub fn subscribe(&self, category: MetricCategory) -> MetricStream {
        let id = StreamId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.capacity);
        let mut stream = MetricStream {
            id,
            category,
            receiver,
        };

        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            stream.close();
            return stream;
        }
        state.entries.insert(id, Subscription { category, sender });
        stream
    }

    /// Remove the stream's subscription and close it. Idempotent.
    ///
    /// Returns whether a subscription was removed.
    pub fn unsubscribe(&self, stream: &mut MetricStream) -> bool {
        let removed = self.remove(stream.id);
        stream.close();
        removed
    }

    /// Remove a subscription by id, dropping the registry's sender.
    pub fn remove(&self, id: StreamId) -> bool {
        self.state.lock().entries.remove(&id).is_some()
    }

    /// Copy the current subscriptions, ordered by id.
    pub fn snapshot_for_delivery(&self) -> Vec<Delivery> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(id, sub)| Delivery {
                id: *id,
                category: sub.category,
                sender: sub.sender.clone(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Number of live subscriptions per category.
    pub fn counts_by_category(&self) -> BTreeMap<MetricCategory, usize> {
        let mut counts = BTreeMap::new();
        for sub in self.state.lock().entries.values() {
            *counts.entry(sub.category).or_insert(0) += 1;
        }
        counts
    }

    /// Drop every subscription and refuse new ones. Returns how many were dropped.
    pub fn close_all(&self) -> usize {
        let entries = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.entries)
        };
        entries.len()
    }
}
